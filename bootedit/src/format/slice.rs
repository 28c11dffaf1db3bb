// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    mem,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;
use zerocopy::{FromBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::{
    stream::{self, FileLen, SectionReader},
    util::{self, NumBytes},
};

pub const BOOT_MAGIC: [u8; 8] = *b"ANDROID!";
pub const VENDOR_BOOT_MAGIC: [u8; 8] = *b"VNDRBOOT";

/// Offset of the `header_version` field in boot images of every version.
pub const HEADER_VERSION_OFFSET: usize = 40;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to access file: {0:?}")]
    File(PathBuf, #[source] io::Error),
    #[error("Slice of {0:?} is empty")]
    EmptySlice(PathBuf),
    #[error("Slice {offset}+{length} is out of bounds for {path:?} ({file_len} bytes)")]
    SliceOutOfBounds {
        path: PathBuf,
        offset: u64,
        length: u64,
        file_len: u64,
    },
    #[error("Failed to read slice data: {0:?}")]
    DataRead(PathBuf, #[source] io::Error),
    #[error("Failed to write slice data: {0:?}")]
    DataWrite(PathBuf, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// A contiguous byte range of a source image that holds one component, along
/// with where the component should be written.
#[derive(Clone, PartialEq, Eq)]
pub struct ComponentSlice {
    source: PathBuf,
    offset: u64,
    length: u64,
    destination: PathBuf,
}

impl fmt::Debug for ComponentSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentSlice")
            .field("source", &self.source)
            .field("offset", &self.offset)
            .field("length", &NumBytes(self.length))
            .field("destination", &self.destination)
            .finish()
    }
}

impl ComponentSlice {
    pub fn new(
        source: impl Into<PathBuf>,
        offset: u64,
        length: u64,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            offset,
            length,
            destination: destination.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }
}

/// Copy the slice's byte range into its destination file. Returns the number of
/// bytes written, which is always the slice length.
///
/// The bounds are checked against the source file before anything is written.
/// The data is staged in a temporary file next to the destination, so a failed
/// extraction never leaves a truncated destination behind.
pub fn extract(slice: &ComponentSlice) -> Result<u64> {
    if slice.length == 0 {
        return Err(Error::EmptySlice(slice.source.clone()));
    }

    let file = File::open(&slice.source).map_err(|e| Error::File(slice.source.clone(), e))?;
    let file_len = file
        .file_len()
        .map_err(|e| Error::File(slice.source.clone(), e))?;

    match slice.offset.checked_add(slice.length) {
        Some(end) if end <= file_len => {}
        _ => {
            return Err(Error::SliceOutOfBounds {
                path: slice.source.clone(),
                offset: slice.offset,
                length: slice.length,
                file_len,
            });
        }
    }

    let reader = SectionReader::new(BufReader::new(file), slice.offset, slice.length)
        .map_err(|e| Error::DataRead(slice.source.clone(), e))?;

    let parent = util::parent_path(&slice.destination);
    let mut temp = NamedTempFile::new_in(parent)
        .map_err(|e| Error::File(slice.destination.clone(), e))?;

    {
        let mut writer = BufWriter::new(temp.as_file_mut());

        stream::copy_n(reader, &mut writer, slice.length).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::DataRead(slice.source.clone(), e)
            } else {
                Error::DataWrite(slice.destination.clone(), e)
            }
        })?;

        writer
            .flush()
            .map_err(|e| Error::DataWrite(slice.destination.clone(), e))?;
    }

    temp.persist(&slice.destination)
        .map_err(|e| Error::File(slice.destination.clone(), e.error))?;

    debug!(
        "Extracted {} bytes at {} from {:?} to {:?}",
        slice.length, slice.offset, slice.source, slice.destination,
    );

    Ok(slice.length)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Boot,
    VendorBoot,
    Unknown,
}

/// Raw on-disk layout of the fields needed to identify an image.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawProbe {
    magic: [u8; 8],
    /// Only meaningful for vendor boot images.
    vendor_header_version: little_endian::U32,
    _reserved: [little_endian::U32; 7],
    header_version: little_endian::U32,
}

const _: () = assert!(mem::offset_of!(RawProbe, header_version) == HEADER_VERSION_OFFSET);

/// Identification of an image based on its first 44 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Probe {
    pub magic: [u8; 8],
    pub kind: ImageKind,
    /// Value at [`HEADER_VERSION_OFFSET`].
    pub header_version: u32,
    /// Vendor boot images store their version directly after the magic.
    pub vendor_header_version: u32,
}

impl Probe {
    pub fn from_reader(mut reader: impl Read) -> io::Result<Self> {
        let raw = RawProbe::read_from_io(&mut reader)?;

        let kind = if raw.magic == BOOT_MAGIC {
            ImageKind::Boot
        } else if raw.magic == VENDOR_BOOT_MAGIC {
            ImageKind::VendorBoot
        } else {
            ImageKind::Unknown
        };

        Ok(Self {
            magic: raw.magic,
            kind,
            header_version: raw.header_version.get(),
            vendor_header_version: raw.vendor_header_version.get(),
        })
    }
}

/// Read the magic and version fields of an image without validating them.
pub fn probe(path: &Path) -> Result<Probe> {
    let file = File::open(path).map_err(|e| Error::File(path.to_owned(), e))?;

    Probe::from_reader(BufReader::new(file)).map_err(|e| Error::DataRead(path.to_owned(), e))
}

/// Read the little-endian `header_version` field at byte 40. Whether the value
/// is a known version is up to the caller.
pub fn probe_header_version(path: &Path) -> Result<u32> {
    probe(path).map(|p| p.header_version)
}
