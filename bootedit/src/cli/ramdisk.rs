/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{
    cli::{args, status},
    format::compression::CompressedFormat,
    pipeline,
};

pub fn ramdisk_main(tools_config: Option<&Path>, cli: &RamdiskCli) -> Result<()> {
    match &cli.command {
        RamdiskCommand::Repack(c) => {
            let tools = args::load_tools(tools_config)?;

            let size = pipeline::repack_ramdisk(&c.root, &tools, &c.output, c.format)
                .with_context(|| format!("Failed to repack ramdisk: {:?}", c.root))?;

            status!("Wrote {size} byte {:?} ramdisk to {:?}", c.format, c.output);
        }
    }

    Ok(())
}

/// Build a ramdisk from a directory tree.
#[derive(Debug, Parser)]
struct RepackCli {
    /// Path to the ramdisk root directory.
    #[arg(long, value_name = "DIRECTORY", value_parser)]
    root: PathBuf,

    /// Path to output ramdisk.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Compression format for the output ramdisk.
    #[arg(short, long, value_enum, default_value = "gzip")]
    format: CompressedFormat,
}

#[derive(Debug, Subcommand)]
enum RamdiskCommand {
    Repack(RepackCli),
}

/// Build ramdisk cpio archives.
#[derive(Debug, Parser)]
pub struct RamdiskCli {
    #[command(subcommand)]
    command: RamdiskCommand,
}
