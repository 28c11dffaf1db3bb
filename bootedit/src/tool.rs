// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! External programs that the unpack and repack pipelines hand components to.
//! Every program is accessed through [`ExternalTool`] so that the pipelines can
//! be driven by fakes in tests.

use std::{
    ffi::{OsStr, OsString},
    fmt,
    fs::File,
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ToolConfig;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Required tool is not available: {0}")]
    Unavailable(String),
    #[error("Failed to run {0}")]
    Spawn(String, #[source] io::Error),
    #[error("Failed to open {1:?} for {0}")]
    File(String, PathBuf, #[source] io::Error),
    #[error("{name} failed with {status}: {stderr}", stderr = .status.stderr.trim_end())]
    Failed { name: String, status: ToolStatus },
}

type Result<T> = std::result::Result<T, Error>;

/// Result of running an external tool to completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolStatus {
    /// Exit code. [`None`] if the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
}

impl ToolStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("termination by signal"),
        }
    }
}

/// A program that converts `input` into `output`. What the paths refer to
/// (file or directory) depends on the tool.
pub trait ExternalTool {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn run(&self, input: &Path, output: &Path) -> Result<ToolStatus>;
}

/// Run a tool and turn a non-zero exit into [`Error::Failed`].
pub fn run_checked(tool: &dyn ExternalTool, input: &Path, output: &Path) -> Result<()> {
    debug!("Running {}: {input:?} -> {output:?}", tool.name());

    let status = tool.run(input, output)?;
    if !status.success() {
        return Err(Error::Failed {
            name: tool.name().to_owned(),
            status,
        });
    }

    Ok(())
}

/// Fail with [`Error::Unavailable`] if a required tool is not present.
pub fn check_available(tool: &dyn ExternalTool) -> Result<()> {
    if !tool.is_available() {
        return Err(Error::Unavailable(tool.name().to_owned()));
    }

    Ok(())
}

/// Run a tool that must be present.
pub fn run_required(tool: &dyn ExternalTool, input: &Path, output: &Path) -> Result<()> {
    check_available(tool)?;
    run_checked(tool, input, output)
}

/// Run a tool only if it is present. Returns whether the tool was run. A tool
/// that is present, but fails, is still an error.
pub fn run_optional(tool: &dyn ExternalTool, input: &Path, output: &Path) -> Result<bool> {
    if !tool.is_available() {
        warn!("{} is not available; skipping {input:?}", tool.name());
        return Ok(false);
    }

    run_checked(tool, input, output)?;

    Ok(true)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
    /// Unpacks a cpio archive (`input`) into a directory (`output`).
    CpioExtract,
    /// Builds a cpio archive (`output`) from a directory (`input`).
    RamdiskBuilder,
    /// Decompiles a device tree blob (`input`) to source form (`output`).
    DeviceTreeDecompiler,
    /// Writes the config and version of a kernel (`input`) into a directory
    /// (`output`).
    KernelInfo,
}

impl ToolKind {
    fn description(self) -> &'static str {
        match self {
            Self::CpioExtract => "cpio archiver",
            Self::RamdiskBuilder => "ramdisk builder",
            Self::DeviceTreeDecompiler => "device tree decompiler",
            Self::KernelInfo => "kernel info extractor",
        }
    }
}

/// An [`ExternalTool`] backed by a program in `PATH` (or an explicit path).
#[derive(Clone, Debug)]
pub struct CommandTool {
    kind: ToolKind,
    program: OsString,
    name: String,
}

impl CommandTool {
    pub fn new(kind: ToolKind, program: impl Into<OsString>) -> Self {
        let program = program.into();
        let name = format!("{} ({})", kind.description(), program.to_string_lossy());

        Self {
            kind,
            program,
            name,
        }
    }

    fn open_input(&self, path: &Path) -> Result<File> {
        File::open(path).map_err(|e| Error::File(self.name.clone(), path.to_owned(), e))
    }

    fn create_output(&self, path: &Path) -> Result<File> {
        File::create(path).map_err(|e| Error::File(self.name.clone(), path.to_owned(), e))
    }

    fn command(&self, input: &Path, output: &Path) -> Result<Command> {
        let mut command = Command::new(&self.program);

        match self.kind {
            ToolKind::CpioExtract => {
                command
                    .args(["-i", "-d", "-m", "--no-absolute-filenames"])
                    .current_dir(output)
                    .stdin(self.open_input(input)?)
                    .stdout(Stdio::null());
            }
            ToolKind::RamdiskBuilder => {
                command
                    .arg(input)
                    .stdin(Stdio::null())
                    .stdout(self.create_output(output)?);
            }
            ToolKind::DeviceTreeDecompiler => {
                command
                    .args(["-I", "dtb", "-O", "dts", "-o"])
                    .arg(output)
                    .arg(input)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null());
            }
            ToolKind::KernelInfo => {
                command
                    .arg("--input")
                    .arg(input)
                    .arg("--output-configs")
                    .arg(output.join("kernel_configs.txt"))
                    .arg("--output-version")
                    .arg(output.join("kernel_version.txt"))
                    .stdin(Stdio::null())
                    .stdout(Stdio::null());
            }
        }

        Ok(command)
    }
}

impl ExternalTool for CommandTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    fn run(&self, input: &Path, output: &Path) -> Result<ToolStatus> {
        let output = self
            .command(input, output)?
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::Spawn(self.name.clone(), e))?;

        Ok(ToolStatus {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The external tools used by the unpack and repack pipelines.
pub struct ToolSet {
    pub cpio: Box<dyn ExternalTool>,
    pub ramdisk_builder: Box<dyn ExternalTool>,
    pub dtc: Box<dyn ExternalTool>,
    pub kernel_info: Box<dyn ExternalTool>,
}

impl ToolSet {
    pub fn from_config(config: &ToolConfig) -> Self {
        fn tool(kind: ToolKind, program: &OsStr) -> Box<dyn ExternalTool> {
            Box::new(CommandTool::new(kind, program))
        }

        Self {
            cpio: tool(ToolKind::CpioExtract, config.cpio.as_os_str()),
            ramdisk_builder: tool(ToolKind::RamdiskBuilder, config.mkbootfs.as_os_str()),
            dtc: tool(ToolKind::DeviceTreeDecompiler, config.dtc.as_os_str()),
            kernel_info: tool(ToolKind::KernelInfo, config.kernel_info.as_os_str()),
        }
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::from_config(&ToolConfig::default())
    }
}
