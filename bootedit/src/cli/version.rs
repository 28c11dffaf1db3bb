// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::{cli::args, format::version};

pub fn version_main(cli: &VersionCli) -> Result<()> {
    match &cli.command {
        VersionCommand::PackOsVersion(c) => {
            let value = version::pack_os_version(c.value.as_deref())
                .with_context(|| format!("Failed to pack OS version: {:?}", c.value))?;
            println!("{value:#x}");
        }
        VersionCommand::UnpackOsVersion(c) => {
            println!("{}", version::unpack_os_version(c.value));
        }
        VersionCommand::PackPatchLevel(c) => {
            let value = version::pack_os_patch_level(c.value.as_deref())
                .with_context(|| format!("Failed to pack patch level: {:?}", c.value))?;
            println!("{value:#x}");
        }
        VersionCommand::UnpackPatchLevel(c) => {
            println!("{}", version::unpack_os_patch_level(c.value));
        }
        VersionCommand::Join(c) => {
            let os_version = version::pack_os_version(c.os_version.as_deref())
                .with_context(|| format!("Failed to pack OS version: {:?}", c.os_version))?;
            let patch_level = version::pack_os_patch_level(c.patch_level.as_deref())
                .with_context(|| format!("Failed to pack patch level: {:?}", c.patch_level))?;

            let value = version::join_os_version_field(os_version, patch_level);
            println!("{value:#x}");
        }
        VersionCommand::Split(c) => {
            let (os_version, patch_level) = version::split_os_version_field(c.value);

            println!("OS version:  {}", version::unpack_os_version(os_version));
            println!("Patch level: {}", version::unpack_os_patch_level(patch_level));
        }
    }

    Ok(())
}

#[derive(Debug, Parser)]
struct PackCli {
    /// Text value to pack. Blank or missing values pack to 0.
    #[arg(value_name = "TEXT")]
    value: Option<String>,
}

#[derive(Debug, Parser)]
struct UnpackCli {
    /// Packed value in decimal or `0x`-prefixed hex.
    #[arg(value_name = "VALUE", value_parser = args::parse_u32)]
    value: u32,
}

#[derive(Debug, Parser)]
struct JoinCli {
    /// OS version (eg. `14.0.0`).
    #[arg(long, value_name = "TEXT")]
    os_version: Option<String>,

    /// Security patch level (eg. `2024-05-05`).
    #[arg(long, value_name = "TEXT")]
    patch_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum VersionCommand {
    /// Pack a MAJOR[.MINOR[.PATCH]] OS version.
    PackOsVersion(PackCli),
    /// Unpack an OS version.
    UnpackOsVersion(UnpackCli),
    /// Pack a YYYY-MM-DD security patch level.
    PackPatchLevel(PackCli),
    /// Unpack a security patch level. The day is always 00.
    UnpackPatchLevel(UnpackCli),
    /// Combine an OS version and patch level into one header field.
    Join(JoinCli),
    /// Split a combined header field.
    Split(UnpackCli),
}

/// Pack or unpack the os_version and os_patch_level header fields.
#[derive(Debug, Parser)]
pub struct VersionCli {
    #[command(subcommand)]
    command: VersionCommand,
}
