// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::io::{self, Seek, Write};

use num_traits::PrimInt;
use thiserror::Error;

use crate::stream::WriteZerosExt;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Page size must not be zero")]
    PageSizeZero,
    #[error("Page size is not a power of two: {0}")]
    PageSizeNotPowerOfTwo(u64),
    #[error("Aligned offset overflowed integer bounds")]
    IntOverflow,
    #[error("Failed to write padding")]
    DataWrite(#[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Fail if `page_size` is not a non-zero power of two.
pub fn check_page_size<N: PrimInt>(page_size: N) -> Result<()> {
    if page_size == N::zero() {
        return Err(Error::PageSizeZero);
    } else if page_size.count_ones() != 1 {
        return Err(Error::PageSizeNotPowerOfTwo(
            page_size.to_u64().unwrap_or(u64::MAX),
        ));
    }

    Ok(())
}

/// Calculate the amount of padding that needs to be added to align the
/// specified offset to a page boundary. The page size must be a power of two.
/// The result is always less than `page_size`.
pub fn padding_size<N: PrimInt>(offset: N, page_size: N) -> Result<N> {
    check_page_size(page_size)?;

    let mask = page_size - N::one();

    // page_size - (offset & mask) is page_size when already aligned, so the
    // second mask folds that case back to zero.
    Ok((page_size - (offset & mask)) & mask)
}

/// [`padding_size`] for 32-bit header fields.
pub fn padding_size_32(offset: u32, page_size: u32) -> Result<u32> {
    padding_size(offset, page_size)
}

/// [`padding_size`] for 64-bit file offsets.
pub fn padding_size_64(offset: u64, page_size: u64) -> Result<u64> {
    padding_size(offset, page_size)
}

/// Round to the next multiple of the page size.
pub fn round<N: PrimInt>(offset: N, page_size: N) -> Result<N> {
    let remain = padding_size(offset, page_size)?;
    offset.checked_add(&remain).ok_or(Error::IntOverflow)
}

/// Write zeros until the next multiple of the page size. [`Seek`] is only used
/// for querying the file position.
pub fn write_zeros(mut writer: impl Write + Seek, page_size: u64) -> Result<u64> {
    let pos = writer.stream_position().map_err(Error::DataWrite)?;
    let padding = padding_size(pos, page_size)?;

    writer
        .write_zeros_exact(padding)
        .map_err(Error::DataWrite)?;

    Ok(padding)
}
