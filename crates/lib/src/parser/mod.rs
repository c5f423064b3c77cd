//! Build description parsing.
//!
//! The rest of the crate only sees [`BuildFileParser`] and the [`RawRecord`]s
//! it yields. The shipped implementation evaluates `BUCK` files as Lua (see
//! [`LuaBuildFileParser`]).

mod lua;

pub use lua::LuaBuildFileParser;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::consts::{BUCK_OUT_DIR, BUILD_FILE_NAME};
use crate::target::{BuildTarget, BuildTargetPattern};

/// A typed attribute value as written in a build file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
  String(String),
  List(Vec<String>),
  Bool(bool),
  Int(i64),
}

impl AttrValue {
  pub fn type_name(&self) -> &'static str {
    match self {
      AttrValue::String(_) => "string",
      AttrValue::List(_) => "list of strings",
      AttrValue::Bool(_) => "boolean",
      AttrValue::Int(_) => "integer",
    }
  }
}

/// One rule declaration, before it is turned into a `BuildRule`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
  pub rule_type: String,
  pub target: BuildTarget,
  pub attributes: BTreeMap<String, AttrValue>,
}

/// A build file could not be read or evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BuildFileParseError {
  pub path: Option<PathBuf>,
  message: String,
}

impl BuildFileParseError {
  /// Failure tied to one build file.
  pub fn for_build_file(path: &Path, cause: impl fmt::Display) -> Self {
    Self {
      path: Some(path.to_path_buf()),
      message: with_cause(format!("Parse error for {} file {}", BUILD_FILE_NAME, path.display()), cause),
    }
  }

  /// Failure while discovering build files.
  pub fn while_collecting(cause: impl fmt::Display) -> Self {
    Self {
      path: None,
      message: with_cause(format!("Parse error while collecting {} files", BUILD_FILE_NAME), cause),
    }
  }

  pub fn human_readable_message(&self) -> &str {
    &self.message
  }
}

fn with_cause(prefix: String, cause: impl fmt::Display) -> String {
  let cause = cause.to_string();
  if cause.is_empty() {
    prefix
  } else {
    format!("{}: {}", prefix, cause)
  }
}

/// Produces raw records for one package.
pub trait BuildFileParser: Send + Sync {
  /// Parse the build file of the package at `base_path` under `project_root`.
  ///
  /// Parsing an unchanged file twice yields equal records.
  fn parse_package(&self, project_root: &Path, base_path: &str) -> Result<Vec<RawRecord>, BuildFileParseError>;
}

/// Find every package whose build file may hold targets matched by `pattern`.
///
/// Returned base paths are sorted. `buck-out` and hidden directories are not
/// searched.
pub fn find_packages(project_root: &Path, pattern: &BuildTargetPattern) -> Result<Vec<String>, BuildFileParseError> {
  let start = match pattern {
    BuildTargetPattern::Single(t) => return Ok(vec![t.base_path().to_string()]),
    BuildTargetPattern::Package(base) => return Ok(vec![base.clone()]),
    BuildTargetPattern::Recursive(base) => project_root.join(base),
  };

  if !start.is_dir() {
    return Err(BuildFileParseError::while_collecting(format!(
      "no such directory: {}",
      start.display()
    )));
  }

  let walker = WalkDir::new(&start).sort_by_file_name().into_iter().filter_entry(|e| {
    if e.depth() == 0 || !e.file_type().is_dir() {
      return true;
    }
    e.file_name()
      .to_str()
      .map(|name| !name.starts_with('.') && name != BUCK_OUT_DIR)
      .unwrap_or(false)
  });

  let mut packages = Vec::new();
  for entry in walker {
    let entry = entry.map_err(BuildFileParseError::while_collecting)?;
    if !entry.file_type().is_file() || entry.file_name() != BUILD_FILE_NAME {
      continue;
    }
    let Some(dir) = entry.path().parent() else {
      continue;
    };
    let rel = dir.strip_prefix(project_root).map_err(BuildFileParseError::while_collecting)?;
    let base_path = rel
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");
    if pattern.covers_package(&base_path) {
      packages.push(base_path);
    }
  }

  packages.sort();
  Ok(packages)
}
