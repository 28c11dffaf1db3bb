// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Packing of the `os_version` and `os_patch_level` boot image header fields.
//!
//! The OS version is stored as three 7-bit components:
//! `(major << 14) | (minor << 7) | patch`. The patch level is stored as a
//! 7-bit year offset from 2000 and a 4-bit month: `((year - 2000) << 4) |
//! month`. The day of the month is never stored, so unpacking always yields
//! day `00`.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// Components of the OS version and the year offset must fit in 7 bits.
const COMPONENT_LIMIT: u32 = 1 << 7;
const PATCH_LEVEL_BASE_YEAR: u32 = 2000;
/// Number of bits used by the patch level in the combined header word of v0-v2
/// boot images.
const PATCH_LEVEL_BITS: u32 = 11;

// Anchored at the start only. Anything after the matched prefix is ignored.
static OS_VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{1,3})(?:\.([0-9]{1,3})(?:\.([0-9]{1,3}))?)?").unwrap());
static PATCH_LEVEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{4})-([0-9]{2})-([0-9]{2})").unwrap());

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid OS version: {0:?}")]
    InvalidOsVersion(String),
    #[error("OS version {0} component must be less than 128: {1}")]
    OsVersionComponentOutOfRange(&'static str, u32),
    #[error("Invalid patch level: {0:?}")]
    InvalidPatchLevel(String),
    #[error("Patch level year must be between 2000 and 2127: {0}")]
    PatchLevelYearOutOfRange(u32),
    #[error("Patch level month must be between 1 and 12: {0}")]
    PatchLevelMonthOutOfRange(u32),
}

type Result<T> = std::result::Result<T, Error>;

/// Parse an optional numeric capture group. The regexes only allow up to 4
/// ASCII digits, so this cannot overflow.
fn capture_u32(captures: &Captures, index: usize) -> u32 {
    captures
        .get(index)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.trim().is_empty())
}

/// Pack a `MAJOR[.MINOR[.PATCH]]` string. [`None`] and blank strings pack to
/// `0`. Missing components are treated as `0`.
pub fn pack_os_version(text: Option<&str>) -> Result<u32> {
    let Some(text) = non_blank(text) else {
        return Ok(0);
    };

    let captures = OS_VERSION_REGEX
        .captures(text)
        .ok_or_else(|| Error::InvalidOsVersion(text.to_owned()))?;

    let mut value = 0;

    for (index, name) in [(1, "major"), (2, "minor"), (3, "patch")] {
        let component = capture_u32(&captures, index);
        if component >= COMPONENT_LIMIT {
            return Err(Error::OsVersionComponentOutOfRange(name, component));
        }

        value = (value << 7) | component;
    }

    Ok(value)
}

/// Unpack an OS version into `MAJOR.MINOR.PATCH` form. Bits above the 21 used
/// by the encoding are ignored.
pub fn unpack_os_version(value: u32) -> String {
    let major = (value >> 14) & 0x7f;
    let minor = (value >> 7) & 0x7f;
    let patch = value & 0x7f;

    format!("{major}.{minor}.{patch}")
}

/// Pack a `YYYY-MM-DD` security patch level. [`None`] and blank strings pack to
/// `0`. The day is validated syntactically, but is not part of the encoding.
pub fn pack_os_patch_level(text: Option<&str>) -> Result<u32> {
    let Some(text) = non_blank(text) else {
        return Ok(0);
    };

    let captures = PATCH_LEVEL_REGEX
        .captures(text)
        .ok_or_else(|| Error::InvalidPatchLevel(text.to_owned()))?;

    let year = capture_u32(&captures, 1);
    let month = capture_u32(&captures, 2);

    let year_offset = year
        .checked_sub(PATCH_LEVEL_BASE_YEAR)
        .filter(|y| *y < COMPONENT_LIMIT)
        .ok_or(Error::PatchLevelYearOutOfRange(year))?;

    if !(1..=12).contains(&month) {
        return Err(Error::PatchLevelMonthOutOfRange(month));
    }

    Ok((year_offset << 4) | month)
}

/// Unpack a security patch level into `YYYY-MM-00` form. The day of the month
/// is not recoverable.
pub fn unpack_os_patch_level(value: u32) -> String {
    let year = ((value >> 4) & 0x7f) + PATCH_LEVEL_BASE_YEAR;
    let month = value & 0xf;

    format!("{year}-{month:02}-00")
}

/// Combine a packed OS version and packed patch level into the single
/// `os_version` header word used by v0 through v2 boot images.
pub fn join_os_version_field(os_version: u32, patch_level: u32) -> u32 {
    (os_version << PATCH_LEVEL_BITS) | (patch_level & ((1 << PATCH_LEVEL_BITS) - 1))
}

/// Split the `os_version` header word of v0 through v2 boot images into the
/// packed OS version and packed patch level.
pub fn split_os_version_field(value: u32) -> (u32, u32) {
    (
        value >> PATCH_LEVEL_BITS,
        value & ((1 << PATCH_LEVEL_BITS) - 1),
    )
}
