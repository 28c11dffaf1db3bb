/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

//! Shell completion scripts for the `bootedit` command line.

use std::io::{self, Write};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use crate::cli::args::Cli;

/// Write the completion script for `shell`. The command name is taken from the
/// clap definition so that it matches the `--help` output.
pub fn write_completion(shell: Shell, writer: &mut dyn Write) {
    let mut command = Cli::command();
    let name = command.get_name().to_owned();

    clap_complete::generate(shell, &mut command, name, writer);
}

pub fn completion_main(cli: &CompletionCli) -> Result<()> {
    write_completion(cli.shell, &mut io::stdout());

    Ok(())
}

/// Generate shell tab completion configs.
#[derive(Debug, Parser)]
pub struct CompletionCli {
    /// The shell to generate completions for.
    #[arg(short, long, value_name = "SHELL", value_parser)]
    pub shell: Shell,
}
