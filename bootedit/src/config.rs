// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read tools config: {0:?}")]
    Read(PathBuf, #[source] io::Error),
    #[error("Failed to parse tools config: {0:?}")]
    Parse(PathBuf, #[source] toml_edit::de::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Programs used for each external tool. Every entry is either a bare program
/// name, which is looked up in `PATH`, or a path to an executable.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub cpio: PathBuf,
    pub mkbootfs: PathBuf,
    pub dtc: PathBuf,
    pub kernel_info: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            cpio: "cpio".into(),
            mkbootfs: "mkbootfs".into(),
            dtc: "dtc".into(),
            kernel_info: "extract_kernel".into(),
        }
    }
}

impl ToolConfig {
    pub fn from_toml(data: &str) -> std::result::Result<Self, toml_edit::de::Error> {
        toml_edit::de::from_str(data)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| Error::Read(path.to_owned(), e))?;

        Self::from_toml(&data).map_err(|e| Error::Parse(path.to_owned(), e))
    }
}
