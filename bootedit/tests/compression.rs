// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::io::{Cursor, Read, Seek, Write};

use assert_matches::assert_matches;
use bootedit::format::compression::{self, CompressedFormat, CompressedReader, CompressedWriter};

fn round_trip(data: &[u8], format: CompressedFormat) {
    let raw_writer = Cursor::new(Vec::new());
    let mut writer = CompressedWriter::new(raw_writer, format);
    writer.write_all(data).unwrap();
    let mut raw_reader = writer.finish().unwrap();

    raw_reader.rewind().unwrap();
    let mut reader = CompressedReader::new(raw_reader, true).unwrap();
    assert_eq!(reader.format(), format);

    let mut new_data = vec![];
    reader.read_to_end(&mut new_data).unwrap();

    assert_eq!(data, new_data);
}

#[test]
fn round_trip_gzip() {
    round_trip(b"gzip-compressed data", CompressedFormat::Gzip);
}

#[test]
fn round_trip_none() {
    round_trip(b"070701 raw cpio data", CompressedFormat::None);
}

#[test]
fn unknown_format() {
    let reader = Cursor::new(b"not compressed");

    assert_matches!(
        CompressedReader::new(reader, false),
        Err(compression::Error::UnknownFormat)
    );
}

#[test]
fn shorter_than_magic() {
    let mut reader = CompressedReader::new(Cursor::new(b"\x1f"), true).unwrap();
    assert_eq!(reader.format(), CompressedFormat::None);

    let mut data = vec![];
    reader.read_to_end(&mut data).unwrap();
    assert_eq!(data, b"\x1f");

    assert_matches!(
        CompressedReader::new(Cursor::new(b""), false),
        Err(compression::Error::UnknownFormat)
    );
}
