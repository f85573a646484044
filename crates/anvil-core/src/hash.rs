//! Content hashing for build inputs and outputs.
//!
//! [`ContentHash`] is a blake3 digest newtype. Inputs are always hashed by
//! content, never by name or timestamp, so moving or touching a file
//! without changing its bytes never perturbs a fingerprint.

use std::fmt;
use std::io::{self, Read};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A 256-bit blake3 content digest.
///
/// Serialized (and displayed) as a lowercase hex string, the durable form
/// used in recorded metadata and in class-manifest artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hashes a byte slice.
    pub fn of_bytes(data: &[u8]) -> Self {
        ContentHash(*blake3::hash(data).as_bytes())
    }

    /// Hashes everything a reader yields, streaming in fixed-size chunks.
    pub fn of_reader(mut reader: impl Read) -> io::Result<Self> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0u8; 8192];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(ContentHash(*hasher.finalize().as_bytes()))
    }

    /// Wraps a raw 32-byte digest.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ContentHash(bytes)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding of the digest.
    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }

    /// Parses the hex form produced by [`ContentHash::to_hex`].
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        blake3::Hash::from_hex(input)
            .map(|hash| ContentHash(*hash.as_bytes()))
            .map_err(|_| CoreError::InvalidHash {
                input: input.to_string(),
            })
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> String {
        hash.to_hex()
    }
}

impl TryFrom<String> for ContentHash {
    type Error = CoreError;

    fn try_from(input: String) -> Result<Self, CoreError> {
        ContentHash::parse(&input)
    }
}
