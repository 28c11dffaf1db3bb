/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    ffi::OsString,
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{
    cli::{args, status},
    format::{
        assemble::{self, OutputBuffer},
        digest::{self, ComponentSet, ContentDigest},
        slice::{self, ComponentSlice, ImageKind},
    },
    pipeline::{self, ComponentKind},
    stream::CountingWriter,
    util,
};

/// Treat empty strings as absent components.
fn optional_paths(paths: &[OsString]) -> Vec<Option<PathBuf>> {
    paths
        .iter()
        .map(|p| {
            if p.is_empty() {
                None
            } else {
                Some(PathBuf::from(p))
            }
        })
        .collect()
}

fn check_digest(actual: &ContentDigest, expected: Option<&ContentDigest>) -> Result<()> {
    println!("{actual}");

    if let Some(expected) = expected {
        digest::assert_equal(expected, actual)?;
        status!("Content digest matches");
    }

    Ok(())
}

fn probe_subcommand(cli: &ProbeCli) -> Result<()> {
    let probe = slice::probe(&cli.input)
        .with_context(|| format!("Failed to probe image: {:?}", cli.input))?;

    match probe.kind {
        ImageKind::Boot => {
            println!("Boot image v{}", probe.header_version);
        }
        ImageKind::VendorBoot => {
            println!("Vendor boot image v{}", probe.vendor_header_version);
        }
        ImageKind::Unknown => {
            println!(
                "Unknown image (magic: {}), header version field: {}",
                probe.magic.escape_ascii(),
                probe.header_version,
            );
        }
    }

    Ok(())
}

fn extract_subcommand(tools_config: Option<&Path>, cli: &ExtractCli) -> Result<()> {
    let tools = args::load_tools(tools_config)?;
    let slice = ComponentSlice::new(&cli.input, cli.offset, cli.size, &cli.output);

    let ramdisk_root = cli
        .ramdisk_root
        .clone()
        .unwrap_or_else(|| util::parent_path(&cli.output).join("root"));

    let unpacked = pipeline::unpack(cli.kind, &slice, &tools, &ramdisk_root)
        .with_context(|| format!("Failed to unpack {:?} from {:?}", cli.kind, cli.input))?;

    status!("Extracted {} bytes to {:?}", unpacked.size, unpacked.path);

    if let Some(format) = unpacked.format {
        status!("Compression format: {format:?}");
    }
    if let Some(decoded) = &unpacked.decoded {
        status!("Decoded to {decoded:?}");
    }

    Ok(())
}

fn pad_subcommand(cli: &PadCli) -> Result<()> {
    let mut buffer = OutputBuffer::new();

    let n = assemble::write_padded(&mut buffer, &cli.input, cli.page_size)
        .with_context(|| format!("Failed to pad: {:?}", cli.input))?;

    fs::write(&cli.output, buffer.as_slice())
        .with_context(|| format!("Failed to write: {:?}", cli.output))?;

    status!(
        "Wrote {n} bytes plus {} bytes of padding to {:?}",
        buffer.position() - n,
        cli.output,
    );

    Ok(())
}

fn assemble_subcommand(cli: &AssembleCli) -> Result<()> {
    let header = fs::read(&cli.header)
        .with_context(|| format!("Failed to read header: {:?}", cli.header))?;
    let components = optional_paths(&cli.components);

    let file = File::create(&cli.output)
        .with_context(|| format!("Failed to open for writing: {:?}", cli.output))?;
    // BufWriter flushes on every seek, including position queries.
    let mut writer = CountingWriter::new(BufWriter::new(file));

    let placements = assemble::assemble(&mut writer, &header, &components, cli.page_size)
        .with_context(|| format!("Failed to assemble image: {:?}", cli.output))?;

    let (writer, size) = writer.finish();
    writer
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("Failed to flush image: {:?}", cli.output))?;
    status!("Wrote {size} byte image to {:?}", cli.output);

    for (component, placement) in components.iter().zip(&placements) {
        match (component, placement) {
            (Some(path), Some(p)) => {
                println!("{path:?}: offset={:#x} size={}", p.offset, p.length);
            }
            _ => println!("<absent>"),
        }
    }

    let id = digest::digest(&components).context("Failed to compute content digest")?;
    check_digest(&id, cli.expect.as_ref())
}

fn digest_subcommand(cli: &DigestCli) -> Result<()> {
    let result = match cli.header_version {
        Some(header_version) => {
            let set = ComponentSet {
                kernel: cli.kernel.clone(),
                ramdisk: cli.ramdisk.clone(),
                second: cli.second.clone(),
                recovery_dtbo: cli.recovery_dtbo.clone(),
                dtb: cli.dtb.clone(),
            };

            set.digest(header_version)
        }
        None => digest::digest(&optional_paths(&cli.inputs)),
    };
    let id = result.context("Failed to compute content digest")?;

    check_digest(&id, cli.expect.as_ref())
}

pub fn image_main(tools_config: Option<&Path>, cli: &ImageCli) -> Result<()> {
    match &cli.command {
        ImageCommand::Probe(c) => probe_subcommand(c),
        ImageCommand::Extract(c) => extract_subcommand(tools_config, c),
        ImageCommand::Pad(c) => pad_subcommand(c),
        ImageCommand::Assemble(c) => assemble_subcommand(c),
        ImageCommand::Digest(c) => digest_subcommand(c),
    }
}

/// Print the magic and header version of an image.
#[derive(Debug, Parser)]
struct ProbeCli {
    /// Path to input image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,
}

/// Extract a component and unpack it with the matching tool.
#[derive(Debug, Parser)]
struct ExtractCli {
    /// Path to input image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Byte offset of the component.
    #[arg(long, value_name = "BYTES", value_parser = args::parse_u64)]
    offset: u64,

    /// Size of the component in bytes.
    #[arg(long, value_name = "BYTES", value_parser = args::parse_u64)]
    size: u64,

    /// Kind of component.
    #[arg(short, long, value_enum)]
    kind: ComponentKind,

    /// Path to output component.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Directory to unpack the ramdisk into. Existing contents are deleted.
    ///
    /// Defaults to `root` next to the output file.
    #[arg(long, value_name = "DIRECTORY", value_parser)]
    ramdisk_root: Option<PathBuf>,
}

/// Copy a file and pad it to a page boundary.
#[derive(Debug, Parser)]
struct PadCli {
    /// Path to input file.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output file.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Page size to align to.
    #[arg(short, long, value_name = "BYTES", value_parser = args::parse_u64, default_value = "4096")]
    page_size: u64,
}

/// Assemble a header block and components into a page-aligned image.
#[derive(Debug, Parser)]
struct AssembleCli {
    /// Path to raw header block.
    #[arg(long, value_name = "FILE", value_parser)]
    header: PathBuf,

    /// Path to output image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Page size to align to.
    #[arg(short, long, value_name = "BYTES", value_parser = args::parse_u64, default_value = "4096")]
    page_size: u64,

    /// Expected content digest of the components.
    #[arg(long, value_name = "HEX", value_parser)]
    expect: Option<ContentDigest>,

    /// Components in image order. An empty string is an absent component.
    #[arg(value_name = "FILE", value_parser)]
    components: Vec<OsString>,
}

/// Compute the content digest of boot image components.
#[derive(Debug, Parser)]
struct DigestCli {
    /// Components in digest order. An empty string is an absent component.
    #[arg(value_name = "FILE", value_parser, conflicts_with = "header_version")]
    inputs: Vec<OsString>,

    /// Use the component order of the header version.
    #[arg(long, value_name = "VERSION")]
    header_version: Option<u32>,

    /// Path to kernel image.
    #[arg(long, value_name = "FILE", value_parser, requires = "header_version")]
    kernel: Option<PathBuf>,

    /// Path to ramdisk image.
    #[arg(long, value_name = "FILE", value_parser, requires = "header_version")]
    ramdisk: Option<PathBuf>,

    /// Path to second stage bootloader image.
    #[arg(long, value_name = "FILE", value_parser, requires = "header_version")]
    second: Option<PathBuf>,

    /// Path to recovery dtbo/acpio image.
    #[arg(long, value_name = "FILE", value_parser, requires = "header_version")]
    recovery_dtbo: Option<PathBuf>,

    /// Path to device tree blob image.
    #[arg(long, value_name = "FILE", value_parser, requires = "header_version")]
    dtb: Option<PathBuf>,

    /// Fail if the digest does not match.
    #[arg(long, value_name = "HEX", value_parser)]
    expect: Option<ContentDigest>,
}

#[derive(Debug, Subcommand)]
enum ImageCommand {
    Probe(ProbeCli),
    Extract(ExtractCli),
    Pad(PadCli),
    Assemble(AssembleCli),
    Digest(DigestCli),
}

/// Extract, place, and hash boot image components.
#[derive(Debug, Parser)]
pub struct ImageCli {
    #[command(subcommand)]
    command: ImageCommand,
}
