/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    io,
    num::ParseIntError,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{Level, debug};

use crate::{
    cli::{boot, completion, ramdisk, version},
    config::ToolConfig,
    tool::ToolSet,
};

/// Parse an integer in decimal or `0x`-prefixed hex.
pub fn parse_u64(s: &str) -> Result<u64, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// Parse an integer in decimal or `0x`-prefixed hex.
pub fn parse_u32(s: &str) -> Result<u32, ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// Load the external tool programs from the config file if one was specified.
pub fn load_tools(path: Option<&Path>) -> Result<ToolSet> {
    let config = match path {
        Some(p) => ToolConfig::load(p)?,
        None => ToolConfig::default(),
    };
    debug!("Tool config: {config:?}");

    Ok(ToolSet::from_config(&config))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

fn init_logging(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::from(level))
        .init();
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Image(boot::ImageCli),
    Version(version::VersionCli),
    Ramdisk(ramdisk::RamdiskCli),
    Completion(completion::CompletionCli),
}

#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Lowest log message severity to output.
    #[arg(long, global = true, value_name = "LEVEL", value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Path to TOML file overriding the external tool programs.
    #[arg(long, global = true, value_name = "FILE", value_parser)]
    pub tools_config: Option<PathBuf>,
}

pub fn main(logging_initialized: &AtomicBool) -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level);
    logging_initialized.store(true, Ordering::SeqCst);

    let tools_config = cli.tools_config.as_deref();

    match &cli.command {
        Command::Image(c) => boot::image_main(tools_config, c),
        Command::Version(c) => version::version_main(c),
        Command::Ramdisk(c) => ramdisk::ramdisk_main(tools_config, c),
        Command::Completion(c) => completion::completion_main(c),
    }
}
