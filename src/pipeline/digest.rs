//! Content digest of downloaded media

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest, Sha256};

use super::Failure;

/// SHA-256 fingerprint of a file's bytes, used as the cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Wrap raw digest bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Digest of an in-memory buffer
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Lowercase hex rendering (the stored cache key)
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentDigest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| format!("not a 64-character hex digest: {e}"))?;
        Ok(Self(bytes))
    }
}

/// Hash a file on disk without loading it whole
///
/// Runs on the blocking pool.
///
/// # Errors
///
/// Returns `HashFailed` if the file cannot be read
pub async fn digest_file(path: &Path) -> Result<ContentDigest, Failure> {
    let path: PathBuf = path.to_path_buf();

    tokio::task::spawn_blocking(move || hash_reader(&path))
        .await
        .map_err(|e| Failure::HashFailed(format!("hashing task failed: {e}")))?
        .map_err(|e| Failure::HashFailed(e.to_string()))
}

fn hash_reader(path: &Path) -> io::Result<ContentDigest> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(ContentDigest(hasher.finalize().into()))
}
