// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Per-component unpack and repack pipelines. Each unpack pipeline extracts a
//! [`ComponentSlice`] and then hands the extracted file to the external tool
//! that understands the component.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use clap::ValueEnum;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    format::{
        compression::{self, CompressedFormat, CompressedReader, CompressedWriter},
        slice::{self, ComponentSlice},
    },
    stream,
    tool::{self, ToolSet},
    util,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to extract component")]
    Slice(#[from] slice::Error),
    #[error("External tool failed")]
    Tool(#[from] tool::Error),
    #[error("Failed to detect ramdisk compression: {0:?}")]
    Compression(PathBuf, #[source] compression::Error),
    #[error("Failed to decompress ramdisk: {0:?}")]
    Decompress(PathBuf, #[source] io::Error),
    #[error("Failed to compress ramdisk: {0:?}")]
    Compress(PathBuf, #[source] io::Error),
    #[error("Failed to access file: {0:?}")]
    File(PathBuf, #[source] io::Error),
    #[error("Failed to recreate directory: {0:?}")]
    Directory(PathBuf, #[source] io::Error),
    #[error("Ramdisk root {root:?} contains the input file {input:?}")]
    RootContainsInput { root: PathBuf, input: PathBuf },
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ComponentKind {
    Kernel,
    Ramdisk,
    Dtb,
    /// Extract only.
    Raw,
}

/// What an unpack pipeline produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unpacked {
    /// The extracted component.
    pub path: PathBuf,
    pub size: u64,
    /// Compression of the extracted data. Only detected for ramdisks.
    pub format: Option<CompressedFormat>,
    /// Output of the component's decoder, if it ran.
    pub decoded: Option<PathBuf>,
}

impl Unpacked {
    fn extracted(slice: &ComponentSlice, size: u64) -> Self {
        Self {
            path: slice.destination().to_owned(),
            size,
            format: None,
            decoded: None,
        }
    }
}

/// Extract a kernel and, if the kernel info tool is available, write the
/// kernel's config and version next to it.
pub fn unpack_kernel(slice: &ComponentSlice, tools: &ToolSet) -> Result<Unpacked> {
    let size = slice::extract(slice)?;
    let mut result = Unpacked::extracted(slice, size);

    let info_dir = util::parent_path(slice.destination());
    if tool::run_optional(tools.kernel_info.as_ref(), slice.destination(), info_dir)? {
        result.decoded = Some(info_dir.to_owned());
    }

    Ok(result)
}

/// Extract a device tree blob and, if the decompiler is available, decompile it
/// to a sibling `.dts` file.
pub fn unpack_dtb(slice: &ComponentSlice, tools: &ToolSet) -> Result<Unpacked> {
    let size = slice::extract(slice)?;
    let mut result = Unpacked::extracted(slice, size);

    let dts = util::with_suffix(slice.destination(), ".dts");
    if tool::run_optional(tools.dtc.as_ref(), slice.destination(), &dts)? {
        result.decoded = Some(dts);
    }

    Ok(result)
}

/// Path that the decompressed form of `path` is written to. The compression
/// suffix is stripped if present. Otherwise, `.cpio` is appended.
fn decompressed_path(path: &Path, format: CompressedFormat) -> PathBuf {
    match format.suffix() {
        Some(suffix) => util::strip_suffix(path, suffix)
            .unwrap_or_else(|| util::with_suffix(path, ".cpio")),
        None => path.to_owned(),
    }
}

/// Decompress `path` if it is compressed. Returns the path to the raw cpio
/// archive and the detected format.
fn decompress_ramdisk(path: &Path) -> Result<(PathBuf, CompressedFormat)> {
    let file = File::open(path).map_err(|e| Error::File(path.to_owned(), e))?;
    let reader = CompressedReader::new(BufReader::new(file), true)
        .map_err(|e| Error::Compression(path.to_owned(), e))?;
    let format = reader.format();

    let raw_path = decompressed_path(path, format);
    if format == CompressedFormat::None {
        return Ok((raw_path, format));
    }

    let mut temp = NamedTempFile::new_in(util::parent_path(&raw_path))
        .map_err(|e| Error::File(raw_path.clone(), e))?;

    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        let n = stream::copy(reader, &mut writer)
            .map_err(|e| Error::Decompress(path.to_owned(), e))?;
        writer
            .flush()
            .map_err(|e| Error::Decompress(path.to_owned(), e))?;

        debug!("Decompressed {format:?} ramdisk to {n} bytes");
    }

    temp.persist(&raw_path)
        .map_err(|e| Error::File(raw_path.clone(), e.error))?;

    Ok((raw_path, format))
}

/// Delete `dir` if it exists and create it again. Unpacking always starts from
/// an empty directory so that repeated unpacks are not merged together.
fn recreate_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!("Removed existing directory: {dir:?}"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::Directory(dir.to_owned(), e)),
    }

    fs::create_dir_all(dir).map_err(|e| Error::Directory(dir.to_owned(), e))
}

/// Fail if clearing `root` would delete any of `inputs`. A root that does not
/// exist yet cannot contain anything.
fn check_root_excludes(root: &Path, inputs: &[&Path]) -> Result<()> {
    let root = match fs::canonicalize(root) {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::Directory(root.to_owned(), e)),
    };

    for input in inputs {
        let canonical =
            fs::canonicalize(input).map_err(|e| Error::File(input.to_path_buf(), e))?;

        if canonical.starts_with(&root) {
            return Err(Error::RootContainsInput {
                root,
                input: input.to_path_buf(),
            });
        }
    }

    Ok(())
}

/// Extract a ramdisk, decompress it, and unpack the cpio archive into `root`.
/// Any existing contents of `root` are deleted first. Unlike the other
/// decoders, the cpio archiver is required. `root` is left untouched if cpio is
/// unavailable or if `root` contains the extracted files.
pub fn unpack_ramdisk(slice: &ComponentSlice, tools: &ToolSet, root: &Path) -> Result<Unpacked> {
    tool::check_available(tools.cpio.as_ref())?;

    let size = slice::extract(slice)?;
    let mut result = Unpacked::extracted(slice, size);

    let (raw_path, format) = decompress_ramdisk(slice.destination())?;
    result.format = Some(format);

    check_root_excludes(root, &[slice.destination(), &raw_path])?;

    recreate_dir(root)?;
    tool::run_checked(tools.cpio.as_ref(), &raw_path, root)?;
    result.decoded = Some(root.to_owned());

    info!("Unpacked {format:?} ramdisk into {root:?}");

    Ok(result)
}

/// Run the unpack pipeline for a component kind. `ramdisk_root` is only used
/// for ramdisks.
pub fn unpack(
    kind: ComponentKind,
    slice: &ComponentSlice,
    tools: &ToolSet,
    ramdisk_root: &Path,
) -> Result<Unpacked> {
    match kind {
        ComponentKind::Kernel => unpack_kernel(slice, tools),
        ComponentKind::Ramdisk => unpack_ramdisk(slice, tools, ramdisk_root),
        ComponentKind::Dtb => unpack_dtb(slice, tools),
        ComponentKind::Raw => {
            let size = slice::extract(slice)?;
            Ok(Unpacked::extracted(slice, size))
        }
    }
}

/// Build a cpio archive from `root` with the ramdisk builder and write it to
/// `output` with the specified compression. Returns the size of `output`.
pub fn repack_ramdisk(
    root: &Path,
    tools: &ToolSet,
    output: &Path,
    format: CompressedFormat,
) -> Result<u64> {
    let parent = util::parent_path(output);

    let cpio = NamedTempFile::new_in(parent).map_err(|e| Error::File(output.to_owned(), e))?;
    tool::run_required(tools.ramdisk_builder.as_ref(), root, cpio.path())?;

    let reader = File::open(cpio.path()).map_err(|e| Error::File(cpio.path().to_owned(), e))?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| Error::File(output.to_owned(), e))?;

    {
        let mut writer = CompressedWriter::new(BufWriter::new(temp.as_file_mut()), format);
        stream::copy(BufReader::new(reader), &mut writer)
            .map_err(|e| Error::Compress(output.to_owned(), e))?;
        writer
            .finish()
            .and_then(|mut w| w.flush())
            .map_err(|e| Error::Compress(output.to_owned(), e))?;
    }

    let n = temp
        .as_file()
        .metadata()
        .map_err(|e| Error::File(output.to_owned(), e))?
        .len();

    temp.persist(output)
        .map_err(|e| Error::File(output.to_owned(), e.error))?;

    info!("Repacked {root:?} into {format:?} ramdisk: {output:?}");

    Ok(n)
}
