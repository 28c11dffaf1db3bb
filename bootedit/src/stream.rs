// SPDX-FileCopyrightText: 2023-2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
};

use crate::util;

/// Size of the buffer used by the copy loops in this module. This only affects
/// performance, never the data that is produced.
pub const COPY_CHUNK_SIZE: usize = 16384;

/// Extensions for writers to easily write zeros (eg. for padding).
pub trait WriteZerosExt {
    fn write_zeros(&mut self, size: u64) -> io::Result<u64>;

    fn write_zeros_exact(&mut self, size: u64) -> io::Result<()> {
        let n = self.write_zeros(size)?;
        if n != size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("Expected to write {size} bytes, but reached EOF after {n} bytes"),
            ));
        }
        Ok(())
    }
}

impl<W: Write> WriteZerosExt for W {
    fn write_zeros(&mut self, size: u64) -> io::Result<u64> {
        // We don't use std::io::copy() on std::io::repeat(0) because it fails
        // if the writer hits EOF before all data is written.
        let mut written = 0;

        while written < size {
            let to_write = (size - written).min(util::ZEROS.len() as u64) as usize;
            let n = self.write(&util::ZEROS[..to_write])?;
            written += n as u64;

            if n < to_write {
                break;
            }
        }

        Ok(written)
    }
}

/// Extensions for readers to read fixed-size buffers.
pub trait ReadFixedSizeExt {
    /// Read fixed-size array.
    fn read_array_exact<const N: usize>(&mut self) -> io::Result<[u8; N]>;
}

impl<R: Read> ReadFixedSizeExt for R {
    fn read_array_exact<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Extensions for file-like types to query the file size. No guarantees are
/// made about the state of the underlying file position after performing any
/// operation.
pub trait FileLen {
    fn file_len(&self) -> io::Result<u64>;
}

impl FileLen for File {
    fn file_len(&self) -> io::Result<u64> {
        self.metadata().map(|m| m.len())
    }
}

/// A writer wrapper that implements [`Seek`], but only for reporting the
/// current file position.
pub struct CountingWriter<W> {
    inner: W,
    offset: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, offset: 0 }
    }

    pub fn finish(self) -> (W, u64) {
        (self.inner, self.offset)
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Seek for CountingWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if pos == SeekFrom::Current(0) {
            Ok(self.offset)
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Can only report current offset",
            ))
        }
    }
}

/// A reader over the `size` bytes of `inner` starting at `start`. Reads past
/// the end of the section return EOF even if `inner` has more data.
pub struct SectionReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read + Seek> SectionReader<R> {
    pub fn new(mut inner: R, start: u64, size: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(start))?;

        Ok(Self {
            inner,
            remaining: size,
        })
    }
}

impl<R: Read> Read for SectionReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let to_read = self.remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..to_read])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Copy exactly `size` bytes from `reader` to `writer`, invoking `inspect`
/// after every buffer read iteration. If either `reader` or `writer` reaches
/// EOF before `size` bytes are copied, an error is returned.
pub fn copy_n_inspect(
    mut reader: impl Read,
    mut writer: impl Write,
    mut size: u64,
    mut inspect: impl FnMut(&[u8]),
) -> io::Result<()> {
    let mut buf = [0u8; COPY_CHUNK_SIZE];

    while size > 0 {
        let to_read = size.min(buf.len() as u64) as usize;
        reader.read_exact(&mut buf[..to_read])?;

        inspect(&buf[..to_read]);

        writer.write_all(&buf[..to_read])?;

        size -= to_read as u64;
    }

    Ok(())
}

/// Copy exactly `size` bytes from `reader` to `writer`.
pub fn copy_n(reader: impl Read, writer: impl Write, size: u64) -> io::Result<()> {
    copy_n_inspect(reader, writer, size, |_| {})
}

/// Copy data from `reader` to `writer` until `reader` reaches EOF, invoking
/// `inspect` after every buffer read iteration. If `writer` reaches EOF before
/// `reader` does, an error is returned.
pub fn copy_inspect(
    mut reader: impl Read,
    mut writer: impl Write,
    mut inspect: impl FnMut(&[u8]),
) -> io::Result<u64> {
    let mut buf = [0u8; COPY_CHUNK_SIZE];
    let mut copied = 0;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        inspect(&buf[..n]);

        writer.write_all(&buf[..n])?;

        copied += n as u64;
    }

    Ok(copied)
}

/// Copy data from `reader` to `writer` until `reader` reaches EOF.
pub fn copy(reader: impl Read, writer: impl Write) -> io::Result<u64> {
    copy_inspect(reader, writer, |_| {})
}
