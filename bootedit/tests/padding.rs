// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::io::{Cursor, Seek, SeekFrom};

use assert_matches::assert_matches;
use bootedit::format::padding;

#[test]
fn padding_laws() {
    for shift in 0..=20 {
        let page_size = 1u64 << shift;

        for offset in [0, 1, 100, 4095, 4096, 4097, 65535, 1 << 20, u64::from(u32::MAX)] {
            let padding = padding::padding_size(offset, page_size).unwrap();

            assert!(padding < page_size, "{offset} / {page_size}");
            assert_eq!((offset + padding) % page_size, 0, "{offset} / {page_size}");
            if offset % page_size == 0 {
                assert_eq!(padding, 0);
            }
        }
    }
}

#[test]
fn padding_examples() {
    assert_eq!(padding::padding_size_32(0, 4096).unwrap(), 0);
    assert_eq!(padding::padding_size_32(1, 4096).unwrap(), 4095);
    assert_eq!(padding::padding_size_32(4096, 4096).unwrap(), 0);
    assert_eq!(padding::padding_size_64(150, 4096).unwrap(), 3946);
    assert_eq!(padding::padding_size_64(2049, 2048).unwrap(), 2047);
}

#[test]
fn padding_near_max() {
    assert_eq!(padding::padding_size_32(u32::MAX, 4096).unwrap(), 1);
    assert_eq!(padding::padding_size_64(u64::MAX - 4095, 4096).unwrap(), 0);
    assert_matches!(
        padding::round(u32::MAX, 4096u32),
        Err(padding::Error::IntOverflow)
    );
}

#[test]
fn invalid_page_size() {
    assert_matches!(
        padding::padding_size_64(10, 0),
        Err(padding::Error::PageSizeZero)
    );
    assert_matches!(
        padding::padding_size_64(10, 3000),
        Err(padding::Error::PageSizeNotPowerOfTwo(3000))
    );
    assert_matches!(
        padding::padding_size_32(10, 4097),
        Err(padding::Error::PageSizeNotPowerOfTwo(4097))
    );
}

#[test]
fn round_up() {
    assert_eq!(padding::round(0u64, 4096).unwrap(), 0);
    assert_eq!(padding::round(1u64, 4096).unwrap(), 4096);
    assert_eq!(padding::round(8192u64, 4096).unwrap(), 8192);
}

#[test]
fn write_padding() {
    let mut writer = Cursor::new(Vec::new());
    writer.seek(SeekFrom::Start(10)).unwrap();

    assert_eq!(padding::write_zeros(&mut writer, 16).unwrap(), 6);
    assert_eq!(padding::write_zeros(&mut writer, 16).unwrap(), 0);
    assert_eq!(writer.get_ref().len(), 16);
}

#[test]
fn write_padding_invalid_page_size() {
    let mut writer = Cursor::new(Vec::new());
    writer.seek(SeekFrom::Start(10)).unwrap();

    assert_matches!(
        padding::write_zeros(&mut writer, 24),
        Err(padding::Error::PageSizeNotPowerOfTwo(24))
    );
    assert!(writer.get_ref().is_empty());
}

#[test]
fn check_page_size() {
    padding::check_page_size(4096u32).unwrap();
    padding::check_page_size(1u64).unwrap();
    assert_matches!(
        padding::check_page_size(0u64),
        Err(padding::Error::PageSizeZero)
    );
}
