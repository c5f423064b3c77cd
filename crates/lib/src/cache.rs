//! Content-addressed artifact cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! manifests/<fp[..2]>/<fingerprint>.json   one ArtifactManifest per fingerprint
//! objects/<hash[..2]>/<content-hash>       each artifact, stored once per content
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! reader sees either a complete entry or nothing. Manifests are published
//! without replacing an existing one: the first writer for a fingerprint wins.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

use crate::fingerprint::Fingerprint;
use crate::util::hash::{ContentHash, hash_file};

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache io error at {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("corrupt cache entry {fingerprint}: {message}")]
  Corrupt { fingerprint: String, message: String },

  #[error("artifact {path} does not match its manifest hash")]
  HashMismatch { path: String },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
  move |source| CacheError::Io {
    path: path.display().to_string(),
    source,
  }
}

/// One output file of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
  /// Relative path with `/` separators.
  pub path: String,
  pub content_hash: ContentHash,
}

/// The outputs stored for one fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
  pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactManifest {
  /// Hash the given files (relative to `root`) into a manifest.
  pub fn from_outputs(root: &Path, outputs: &[PathBuf]) -> Result<Self, CacheError> {
    let mut artifacts = Vec::with_capacity(outputs.len());
    for output in outputs {
      let full = root.join(output);
      let content_hash = hash_file(&full).map_err(|e| CacheError::Io {
        path: e.path,
        source: e.source,
      })?;
      artifacts.push(ArtifactEntry {
        path: output.to_string_lossy().replace('\\', "/"),
        content_hash,
      });
    }
    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(Self { artifacts })
  }
}

/// A directory-backed artifact cache.
#[derive(Debug)]
pub struct ArtifactCache {
  root: PathBuf,
  write_locks: Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>,
}

impl ArtifactCache {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      write_locks: Mutex::new(HashMap::new()),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn manifest_path(&self, fingerprint: &Fingerprint) -> PathBuf {
    let fp = fingerprint.as_str();
    self
      .root
      .join("manifests")
      .join(&fp[..2.min(fp.len())])
      .join(format!("{}.json", fp))
  }

  fn object_path(&self, hash: &ContentHash) -> PathBuf {
    let h = hash.0.as_str();
    self.root.join("objects").join(&h[..2.min(h.len())]).join(h)
  }

  fn write_lock(&self, fingerprint: &Fingerprint) -> Arc<Mutex<()>> {
    let mut locks = match self.write_locks.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    Arc::clone(locks.entry(fingerprint.clone()).or_default())
  }

  /// Look up the manifest stored for `fingerprint`.
  ///
  /// A manifest that does not deserialize is deleted before `Corrupt` is
  /// returned, so the next `put` can replace it.
  pub fn get(&self, fingerprint: &Fingerprint) -> Result<Option<ArtifactManifest>, CacheError> {
    let path = self.manifest_path(fingerprint);
    let bytes = match fs::read(&path) {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(io_err(&path)(e)),
    };
    match serde_json::from_slice(&bytes) {
      Ok(manifest) => Ok(Some(manifest)),
      Err(e) => {
        if let Err(remove) = fs::remove_file(&path) {
          warn!(path = %path.display(), error = %remove, "failed to remove corrupt manifest");
        }
        Err(CacheError::Corrupt {
          fingerprint: fingerprint.to_string(),
          message: e.to_string(),
        })
      }
    }
  }

  /// Store the artifacts named by `manifest`, reading them from
  /// `artifact_root`, and publish the manifest under `fingerprint`.
  ///
  /// Returns `false` when an entry already existed; nothing is changed then.
  pub fn put(
    &self,
    fingerprint: &Fingerprint,
    manifest: &ArtifactManifest,
    artifact_root: &Path,
  ) -> Result<bool, CacheError> {
    let lock = self.write_lock(fingerprint);
    let _guard = match lock.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };

    let manifest_path = self.manifest_path(fingerprint);
    if manifest_path.exists() {
      debug!(fingerprint = %fingerprint, "cache entry already present");
      return Ok(false);
    }

    for artifact in &manifest.artifacts {
      let object = self.object_path(&artifact.content_hash);
      if object.exists() {
        continue;
      }
      let source = artifact_root.join(&artifact.path);
      let actual = hash_file(&source).map_err(|e| CacheError::Io {
        path: e.path,
        source: e.source,
      })?;
      if actual != artifact.content_hash {
        return Err(CacheError::HashMismatch {
          path: artifact.path.clone(),
        });
      }
      let bytes = fs::read(&source).map_err(io_err(&source))?;
      write_atomic(&object, &bytes, true)?;
    }

    let json = serde_json::to_vec_pretty(manifest).map_err(|e| CacheError::Corrupt {
      fingerprint: fingerprint.to_string(),
      message: e.to_string(),
    })?;
    let stored = write_atomic(&manifest_path, &json, false)?;
    debug!(fingerprint = %fingerprint, artifacts = manifest.artifacts.len(), stored, "cache put");
    Ok(stored)
  }

  /// Copy every artifact of `manifest` to `dest_dir/<path>`.
  pub fn materialize(&self, manifest: &ArtifactManifest, dest_dir: &Path) -> Result<(), CacheError> {
    for artifact in &manifest.artifacts {
      let object = self.object_path(&artifact.content_hash);
      let bytes = fs::read(&object).map_err(io_err(&object))?;
      write_atomic(&dest_dir.join(&artifact.path), &bytes, true)?;
    }
    Ok(())
  }
}

/// Write `bytes` to a temporary file next to `path` and move it into place.
///
/// With `replace = false` an existing file is left alone and `false` is
/// returned.
fn write_atomic(path: &Path, bytes: &[u8], replace: bool) -> Result<bool, CacheError> {
  let dir = path.parent().unwrap_or_else(|| Path::new("."));
  fs::create_dir_all(dir).map_err(io_err(dir))?;

  let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
  tmp.write_all(bytes).map_err(io_err(dir))?;
  tmp.as_file().sync_all().map_err(io_err(path))?;

  if replace {
    tmp.persist(path).map_err(|e| io_err(path)(e.error))?;
    return Ok(true);
  }
  match tmp.persist_noclobber(path) {
    Ok(_) => Ok(true),
    Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
    Err(e) => Err(io_err(path)(e.error)),
  }
}
