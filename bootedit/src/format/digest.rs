// SPDX-FileCopyrightText: 2023-2024 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
    str::FromStr,
};

use ring::digest::{Context, SHA1_FOR_LEGACY_USE_ONLY};
use thiserror::Error;
use tracing::debug;

use crate::stream;

pub const DIGEST_SIZE: usize = 20;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to open component: {0:?}")]
    File(PathBuf, #[source] io::Error),
    #[error("Failed to read component: {0:?}")]
    DataRead(PathBuf, #[source] io::Error),
    #[error("Component {0:?} is too large for a 32-bit length field: {1} bytes")]
    LengthOverflow(PathBuf, u64),
    #[error("Content digest mismatch: expected {expected}, but have {actual}")]
    HashMismatch {
        expected: ContentDigest,
        actual: ContentDigest,
    },
    #[error("Header version {0} does not have a content digest")]
    UnsupportedHeaderVersion(u32),
    #[error("Invalid content digest hex string")]
    InvalidHex(#[source] hex::FromHexError),
}

type Result<T> = std::result::Result<T, Error>;

/// SHA-1 identity of a list of boot image components. This is the value stored
/// in the `id` field of v0 through v2 boot image headers.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest(pub [u8; DIGEST_SIZE]);

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContentDigest")
            .field(&hex::encode(self.0))
            .finish()
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ContentDigest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut buf = [0u8; DIGEST_SIZE];
        hex::decode_to_slice(s, &mut buf).map_err(Error::InvalidHex)?;
        Ok(Self(buf))
    }
}

/// Streaming computation of a [`ContentDigest`]. Each component contributes
/// its data followed by its size as a little-endian u32. Absent components
/// contribute only a zero size.
pub struct ContentHasher {
    context: Context,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHasher {
    pub fn new() -> Self {
        Self {
            context: Context::new(&SHA1_FOR_LEGACY_USE_ONLY),
        }
    }

    pub fn update_absent(&mut self) {
        self.context.update(&0u32.to_le_bytes());
    }

    /// Hash all data from `reader` followed by its length. Returns the number
    /// of bytes read. `LengthOverflow` is reported with `name` if the data does
    /// not fit in the 32-bit length field.
    pub fn update_reader(&mut self, reader: impl Read, name: &Path) -> Result<u32> {
        let context = &mut self.context;
        let n = stream::copy_inspect(reader, io::sink(), |buf| context.update(buf))
            .map_err(|e| Error::DataRead(name.to_owned(), e))?;

        self.update_length(n, name)
    }

    /// Terminate a component with its 32-bit length field.
    fn update_length(&mut self, n: u64, name: &Path) -> Result<u32> {
        let n = u32::try_from(n).map_err(|_| Error::LengthOverflow(name.to_owned(), n))?;

        self.context.update(&n.to_le_bytes());

        Ok(n)
    }

    pub fn update_file(&mut self, path: &Path) -> Result<u32> {
        let file = File::open(path).map_err(|e| Error::File(path.to_owned(), e))?;
        let n = self.update_reader(file, path)?;

        debug!("Hashed {n} bytes from {path:?}");

        Ok(n)
    }

    pub fn finish(self) -> ContentDigest {
        let digest = self.context.finish();
        let mut buf = [0u8; DIGEST_SIZE];
        buf.copy_from_slice(digest.as_ref());

        ContentDigest(buf)
    }
}

/// Compute the content digest of the specified components in order. [`None`]
/// entries represent absent components. The order is significant.
pub fn digest<P: AsRef<Path>>(inputs: &[Option<P>]) -> Result<ContentDigest> {
    let mut hasher = ContentHasher::new();

    for input in inputs {
        match input {
            Some(path) => {
                hasher.update_file(path.as_ref())?;
            }
            None => hasher.update_absent(),
        }
    }

    Ok(hasher.finish())
}

/// Fail with [`Error::HashMismatch`] if the digests differ.
pub fn assert_equal(expected: &ContentDigest, actual: &ContentDigest) -> Result<()> {
    if expected != actual {
        return Err(Error::HashMismatch {
            expected: *expected,
            actual: *actual,
        });
    }

    Ok(())
}

/// The set of components that take part in the content digest of a boot image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComponentSet {
    pub kernel: Option<PathBuf>,
    pub ramdisk: Option<PathBuf>,
    pub second: Option<PathBuf>,
    pub recovery_dtbo: Option<PathBuf>,
    pub dtb: Option<PathBuf>,
}

impl ComponentSet {
    /// Get the digest inputs for a header version. The order is `kernel`,
    /// `ramdisk`, `second`, then `recovery_dtbo` for v1+ and `dtb` for v2.
    /// v3+ images are hashed by AVB only and have no content digest.
    pub fn digest_inputs(&self, header_version: u32) -> Result<Vec<Option<&Path>>> {
        if header_version > 2 {
            return Err(Error::UnsupportedHeaderVersion(header_version));
        }

        let mut inputs = vec![
            self.kernel.as_deref(),
            self.ramdisk.as_deref(),
            self.second.as_deref(),
        ];

        if header_version >= 1 {
            inputs.push(self.recovery_dtbo.as_deref());
        }
        if header_version == 2 {
            inputs.push(self.dtb.as_deref());
        }

        Ok(inputs)
    }

    pub fn digest(&self, header_version: u32) -> Result<ContentDigest> {
        digest(&self.digest_inputs(header_version)?)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn length_field_limit() {
        let name = Path::new("kernel");
        let mut hasher = ContentHasher::new();

        assert_eq!(
            hasher.update_length(u64::from(u32::MAX), name).unwrap(),
            u32::MAX
        );
        assert_matches!(
            hasher.update_length(u64::from(u32::MAX) + 1, name),
            Err(Error::LengthOverflow(p, n)) if p == name && n == 1 << 32
        );
    }

    #[test]
    fn length_field_encoding() {
        let name = Path::new("ramdisk");

        let mut hasher = ContentHasher::new();
        hasher.update_length(0x0102_0304, name).unwrap();

        let mut expected = Context::new(&SHA1_FOR_LEGACY_USE_ONLY);
        expected.update(&[0x04, 0x03, 0x02, 0x01]);

        assert_eq!(hasher.finish().as_bytes(), expected.finish().as_ref());
    }
}
