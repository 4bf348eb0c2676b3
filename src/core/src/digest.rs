//! Content digests (`algorithm:hex`).

use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256, Sha512};

use crate::error::{BakeError, Result};

/// Hash algorithm of a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Lowercase identifier used in digest strings and blob paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Length of the hash in bytes.
    pub fn hash_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = BakeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(BakeError::InvalidDigest(format!(
                "unsupported algorithm '{}' (supported: sha256, sha512)",
                other
            ))),
        }
    }
}

/// A content digest. Always computed from content, never chosen.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest {
    algorithm: DigestAlgorithm,
    hash: Vec<u8>,
}

impl Digest {
    /// Build a digest from raw hash bytes, checking the length.
    pub fn new(algorithm: DigestAlgorithm, hash: Vec<u8>) -> Result<Self> {
        if hash.len() != algorithm.hash_len() {
            return Err(BakeError::InvalidDigest(format!(
                "{} hash must be {} bytes, got {}",
                algorithm,
                algorithm.hash_len(),
                hash.len()
            )));
        }
        Ok(Self { algorithm, hash })
    }

    /// Digest of a byte slice.
    pub fn of_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        let hash = match algorithm {
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        };
        Self { algorithm, hash }
    }

    /// Digest of a file's contents, streamed.
    pub fn of_file(algorithm: DigestAlgorithm, path: &Path) -> Result<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut buffer = [0u8; 8192];
        let hash = match algorithm {
            DigestAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                loop {
                    let n = file.read(&mut buffer)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buffer[..n]);
                }
                hasher.finalize().to_vec()
            }
            DigestAlgorithm::Sha512 => {
                let mut hasher = Sha512::new();
                loop {
                    let n = file.read(&mut buffer)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buffer[..n]);
                }
                hasher.finalize().to_vec()
            }
        };
        Ok(Self { algorithm, hash })
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn hash(&self) -> &[u8] {
        &self.hash
    }

    /// Lowercase hex encoding of the hash.
    pub fn encoded(&self) -> String {
        hex::encode(&self.hash)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded())
    }
}

impl FromStr for Digest {
    type Err = BakeError;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, encoded) = s
            .split_once(':')
            .ok_or_else(|| BakeError::InvalidDigest(format!("'{}': expected algorithm:hex", s)))?;
        let algorithm: DigestAlgorithm = algorithm.parse()?;
        if encoded.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(BakeError::InvalidDigest(format!("'{}': hex must be lowercase", s)));
        }
        let hash = hex::decode(encoded)
            .map_err(|e| BakeError::InvalidDigest(format!("'{}': {}", s, e)))?;
        Self::new(algorithm, hash)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
