//! Execution context shared by every step of an invocation.
//!
//! The context is read-only once built. Steps receive it behind an `Arc` and
//! may use it from many tasks at once.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tracing::trace;

use crate::rules::BuildRuleStatus;
use crate::target::BuildTarget;

/// Project-relative file operations.
///
/// Every path argument is relative to the project root; absolute paths are
/// passed through unchanged by [`ProjectFilesystem::resolve`].
#[derive(Debug, Clone)]
pub struct ProjectFilesystem {
  root: PathBuf,
}

impl ProjectFilesystem {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
    self.root.join(path)
  }

  pub fn exists(&self, path: impl AsRef<Path>) -> bool {
    self.resolve(path).exists()
  }

  pub async fn read(&self, path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
    tokio::fs::read(self.resolve(path)).await
  }

  /// Write a file, creating missing parent directories.
  pub async fn write(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> io::Result<()> {
    let path = self.resolve(path);
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await
  }

  pub async fn mkdirs(&self, path: impl AsRef<Path>) -> io::Result<()> {
    tokio::fs::create_dir_all(self.resolve(path)).await
  }

  /// Remove a directory tree if present, then recreate it empty.
  pub async fn make_clean_dir(&self, path: impl AsRef<Path>) -> io::Result<()> {
    let path = self.resolve(path);
    match tokio::fs::remove_dir_all(&path).await {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(path).await
  }

  /// Copy a regular file. The destination is always a real file, never a link.
  pub async fn copy(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> io::Result<()> {
    tokio::fs::copy(self.resolve(from), self.resolve(to)).await.map(|_| ())
  }

  /// Files directly inside `dir` with the given extension, sorted by name.
  /// A missing directory yields an empty list.
  pub async fn files_with_extension(&self, dir: impl AsRef<Path>, extension: &str) -> io::Result<Vec<PathBuf>> {
    let dir = self.resolve(dir);
    let mut entries = match tokio::fs::read_dir(&dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if entry.file_type().await?.is_file() && path.extension().is_some_and(|ext| ext == extension) {
        files.push(path);
      }
    }
    files.sort();
    Ok(files)
  }
}

/// Progress notifications published while building and testing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
  RuleStarted { target: BuildTarget },
  RuleFinished { target: BuildTarget, status: BuildRuleStatus },
  StepStarted { target: BuildTarget, description: String },
  TestsStarted { target: BuildTarget },
  TestsFinished { target: BuildTarget, passed: bool },
}

/// Where [`BuildEvent`]s go. A sink without a receiver drops everything.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
  tx: Option<mpsc::UnboundedSender<BuildEvent>>,
}

impl EventSink {
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<BuildEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx: Some(tx) }, rx)
  }

  pub fn emit(&self, event: BuildEvent) {
    if let Some(tx) = &self.tx {
      if tx.send(event).is_err() {
        trace!("event receiver dropped");
      }
    }
  }
}

/// Everything a step may look at while it runs.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
  filesystem: ProjectFilesystem,
  env: BTreeMap<String, String>,
  debug: bool,
  events: EventSink,
}

impl ExecutionContext {
  pub fn new(filesystem: ProjectFilesystem, env: BTreeMap<String, String>, debug: bool) -> Self {
    Self {
      filesystem,
      env,
      debug,
      events: EventSink::default(),
    }
  }

  pub fn with_events(mut self, events: EventSink) -> Self {
    self.events = events;
    self
  }

  pub fn filesystem(&self) -> &ProjectFilesystem {
    &self.filesystem
  }

  /// Environment handed to every spawned process.
  pub fn env(&self) -> &BTreeMap<String, String> {
    &self.env
  }

  pub fn is_debug_enabled(&self) -> bool {
    self.debug
  }

  pub fn events(&self) -> &EventSink {
    &self.events
  }
}
