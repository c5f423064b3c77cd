//! Hashing utilities for fingerprints and content-addressed storage.
//!
//! - `ContentHash`: full 64-character SHA-256 of some content
//! - `hash_file()`: streaming hash of one file
//! - `hash_bytes()`: hash of arbitrary bytes

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A full 64-character SHA-256 hash, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// A file could not be read while hashing.
#[derive(Debug, thiserror::Error)]
#[error("failed to read file {path}: {source}")]
pub struct HashError {
  pub path: String,
  #[source]
  pub source: io::Error,
}

/// Hash a file's contents.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let to_err = |source| HashError {
    path: path.display().to_string(),
    source,
  };
  let mut file = fs::File::open(path).map_err(to_err)?;

  let mut hasher = Sha256::new();
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(to_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(ContentHash(format!("{:x}", hasher.finalize())))
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}
