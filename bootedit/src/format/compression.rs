// SPDX-FileCopyrightText: 2023-2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::io::{self, Read, Seek, Write};

use clap::ValueEnum;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use thiserror::Error;

use crate::stream::ReadFixedSizeExt;

static GZIP_MAGIC: &[u8; 2] = b"\x1f\x8b";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown compression format")]
    UnknownFormat,
    #[error("I/O error when autodetecting compression format")]
    AutoDetect(#[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompressedFormat {
    None,
    Gzip,
}

impl CompressedFormat {
    /// File name suffix conventionally used for this format.
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gzip => Some(".gz"),
        }
    }
}

#[derive(Debug)]
pub enum CompressedReader<R: Read> {
    None(R),
    Gzip(GzDecoder<R>),
}

impl<R: Read> CompressedReader<R> {
    pub fn format(&self) -> CompressedFormat {
        match self {
            Self::None(_) => CompressedFormat::None,
            Self::Gzip(_) => CompressedFormat::Gzip,
        }
    }
}

impl<R: Read + Seek> CompressedReader<R> {
    /// Detect the format from the magic bytes. If `raw_if_unknown` is set, data
    /// without a known magic, including data shorter than any magic, is read
    /// as-is.
    pub fn new(mut reader: R, raw_if_unknown: bool) -> Result<Self> {
        let magic = match reader.read_array_exact::<2>() {
            Ok(m) => Some(m),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => None,
            Err(e) => return Err(Error::AutoDetect(e)),
        };

        reader.rewind().map_err(Error::AutoDetect)?;

        if magic.as_ref() == Some(GZIP_MAGIC) {
            Ok(Self::Gzip(GzDecoder::new(reader)))
        } else if raw_if_unknown {
            Ok(Self::None(reader))
        } else {
            Err(Error::UnknownFormat)
        }
    }
}

impl<R: Read> Read for CompressedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::None(r) => r.read(buf),
            Self::Gzip(r) => r.read(buf),
        }
    }
}

pub enum CompressedWriter<W: Write> {
    None(W),
    Gzip(GzEncoder<W>),
}

impl<W: Write> CompressedWriter<W> {
    pub fn new(writer: W, format: CompressedFormat) -> Self {
        match format {
            CompressedFormat::None => Self::None(writer),
            CompressedFormat::Gzip => Self::Gzip(GzEncoder::new(writer, Compression::default())),
        }
    }

    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::None(w) => Ok(w),
            Self::Gzip(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::None(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::None(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
        }
    }
}
