//! SHA256 digest utilities for SIF images
//!
//! Provides the structured [`Hash`] type used for blob digests, plus helpers
//! for computing digests of local files and in-memory data.

use crate::error::{OrasError, Result};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

pub const SHA256: &str = "sha256";

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// A content digest in `algorithm:hex` form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: String,
    pub hex: String,
}

impl FromStr for Hash {
    type Err = OrasError;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, hex_part) = s
            .split_once(':')
            .ok_or_else(|| OrasError::Digest(format!("cannot parse hash: {:?}", s)))?;

        if algorithm.is_empty() || hex_part.is_empty() || hex_part.contains(':') {
            return Err(OrasError::Digest(format!("cannot parse hash: {:?}", s)));
        }

        if algorithm != SHA256 {
            return Err(OrasError::Digest(format!(
                "unsupported digest algorithm {:?} in {:?}",
                algorithm, s
            )));
        }

        if !DigestUtils::is_valid_sha256_hex(hex_part) {
            return Err(OrasError::Digest(format!(
                "invalid sha256 hex in {:?}: expected 64 lowercase hex characters",
                s
            )));
        }

        Ok(Hash {
            algorithm: algorithm.to_string(),
            hex: hex_part.to_string(),
        })
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Utilities for working with SHA256 digests
pub struct DigestUtils;

impl DigestUtils {
    /// Compute full digest (with sha256: prefix) from byte data
    pub fn compute_digest(data: &[u8]) -> String {
        format!("{}:{}", SHA256, hex::encode(Sha256::digest(data)))
    }

    /// Validate SHA256 hex string (64 characters, lowercase hex)
    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64
            && digest
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    /// Stream a reader through sha256, returning the `sha256:<hex>` string and
    /// the number of bytes read
    pub fn sha256sum<R: Read>(mut reader: R) -> std::io::Result<(String, u64)> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            total += n as u64;
        }
        Ok((format!("{}:{}", SHA256, hex::encode(hasher.finalize())), total))
    }
}

/// Compute the digest of a local file's full contents
pub fn image_hash(path: &Path) -> Result<Hash> {
    let file = std::fs::File::open(path).map_err(|e| OrasError::io(path, e))?;
    let (digest, _) = DigestUtils::sha256sum(file).map_err(|e| OrasError::io(path, e))?;
    digest.parse()
}
