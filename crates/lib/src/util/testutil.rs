//! Test helpers shared by unit tests.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::context::{ExecutionContext, ProjectFilesystem};

/// Returns an argv that runs `script` through the platform shell.
#[cfg(unix)]
pub fn shell_argv(script: &str) -> Vec<String> {
  vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

#[cfg(windows)]
pub fn shell_argv(script: &str) -> Vec<String> {
  vec!["cmd.exe".to_string(), "/C".to_string(), script.to_string()]
}

/// Context rooted at `root` with the process `PATH` and no event receiver.
pub fn context_for(root: &Path, debug: bool) -> Arc<ExecutionContext> {
  let mut env = BTreeMap::new();
  if let Ok(path) = std::env::var("PATH") {
    env.insert("PATH".to_string(), path);
  }
  Arc::new(ExecutionContext::new(ProjectFilesystem::new(root), env, debug))
}
