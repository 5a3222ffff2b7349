//! MD5 digests of write payloads.

use crate::error::{Result, TxfsError};
use md5::{Digest, Md5};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// MD5 digest a client may attach to a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 16]);

impl Checksum {
    pub fn of(data: &[u8]) -> Self {
        Self(Md5::digest(data).into())
    }

    /// Hashes a file without loading it whole.
    pub fn of_file(path: &Path) -> io::Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Md5::new();
        io::copy(&mut file, &mut hasher)?;
        Ok(Self(hasher.finalize().into()))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Fails with `IllegalOperation` unless `data` hashes to `self`.
    pub fn verify(&self, data: &[u8], what: &dyn fmt::Display) -> Result<()> {
        let actual = Self::of(data);
        if actual != *self {
            return Err(TxfsError::IllegalOperation(format!(
                "checksum mismatch for {}: expected {}, got {}",
                what, self, actual
            )));
        }
        Ok(())
    }
}

impl From<[u8; 16]> for Checksum {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Checksum {
    type Err = TxfsError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|e| {
            TxfsError::IllegalOperation(format!("invalid MD5 checksum '{}': {}", s, e))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
