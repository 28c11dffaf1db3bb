// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    fs::File,
    io::{self, Cursor, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

use crate::{
    format::{padding, slice::ComponentSlice},
    stream,
    util::NumBytes,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to open component: {0:?}")]
    File(PathBuf, #[source] io::Error),
    #[error("Failed to read component: {0:?}")]
    DataRead(PathBuf, #[source] io::Error),
    #[error("Failed to write image data: {0}")]
    DataWrite(&'static str, #[source] io::Error),
    #[error("Failed to pad image data")]
    Padding(#[from] padding::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Growable in-memory buffer for assembling an image. The cursor is the current
/// write position and writes past the end grow the buffer.
#[derive(Clone, Default)]
pub struct OutputBuffer {
    inner: Cursor<Vec<u8>>,
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("data", &NumBytes(self.inner.get_ref().len()))
            .field("position", &self.inner.position())
            .finish()
    }
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.inner.get_ref()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for OutputBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Append the contents of `path` at the writer's current position and then
/// write zeros up to the next multiple of `page_size`. Nothing is written if
/// `page_size` is invalid. Returns the number of
/// content bytes written, excluding the padding.
pub fn write_padded(mut writer: impl Write + Seek, path: &Path, page_size: u64) -> Result<u64> {
    padding::check_page_size(page_size)?;

    let file = File::open(path).map_err(|e| Error::File(path.to_owned(), e))?;

    let n = stream::copy(file, &mut writer).map_err(|e| Error::DataRead(path.to_owned(), e))?;
    let padding = padding::write_zeros(&mut writer, page_size)?;

    debug!("Wrote {n} bytes from {path:?} with {padding} bytes of padding");

    Ok(n)
}

/// Write zeros up to the next multiple of `page_size` without writing any new
/// content. Returns the number of zeros written.
pub fn pad_buffer(writer: impl Write + Seek, page_size: u64) -> Result<u64> {
    Ok(padding::write_zeros(writer, page_size)?)
}

/// Location of a component within an assembled image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub offset: u64,
    pub length: u64,
}

impl Placement {
    /// Describe the placement as a slice of `source`. Returns [`None`] for
    /// empty components, which are absent from the image.
    pub fn to_slice(&self, source: &Path, destination: &Path) -> Option<ComponentSlice> {
        if self.length == 0 {
            return None;
        }

        Some(ComponentSlice::new(
            source,
            self.offset,
            self.length,
            destination,
        ))
    }
}

/// Write `header` followed by each present component, with every section
/// starting on a page boundary. The header itself is produced by the caller.
/// Absent components occupy no space, but still get an entry in the returned
/// list so that the result lines up with `components`.
pub fn assemble<P: AsRef<Path>>(
    mut writer: impl Write + Seek,
    header: &[u8],
    components: &[Option<P>],
    page_size: u64,
) -> Result<Vec<Option<Placement>>> {
    padding::check_page_size(page_size)?;

    writer
        .write_all(header)
        .map_err(|e| Error::DataWrite("header", e))?;
    pad_buffer(&mut writer, page_size)?;

    let mut placements = Vec::with_capacity(components.len());

    for component in components {
        let Some(path) = component else {
            placements.push(None);
            continue;
        };

        let offset = writer
            .stream_position()
            .map_err(|e| Error::DataWrite("component offset", e))?;
        let length = write_padded(&mut writer, path.as_ref(), page_size)?;

        placements.push(Some(Placement { offset, length }));
    }

    writer
        .flush()
        .map_err(|e| Error::DataWrite("flush", e))?;

    Ok(placements)
}
