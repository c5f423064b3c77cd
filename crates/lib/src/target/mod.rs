//! Build target identifiers.
//!
//! A [`BuildTarget`] names one rule: `//base/path:short_name`. The base path is
//! the package directory relative to the project root and may be empty
//! (`//:name` lives in the root package).

mod pattern;

pub use pattern::{BuildTargetPattern, allowed};

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::BUILD_FILE_NAME;

/// A target name that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed build target `{target}`: {reason}")]
pub struct MalformedTarget {
  pub target: String,
  pub reason: &'static str,
}

impl MalformedTarget {
  fn new(target: &str, reason: &'static str) -> Self {
    Self {
      target: target.to_string(),
      reason,
    }
  }
}

/// Canonical identity of a rule.
///
/// Equality and hashing use the `(base_path, short_name)` pair. Ordering
/// follows the fully qualified name so that sorted collections list targets
/// the way users read them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildTarget {
  base_path: String,
  short_name: String,
}

impl BuildTarget {
  /// Create a target from its parts, validating both.
  pub fn new(base_path: &str, short_name: &str) -> Result<Self, MalformedTarget> {
    let display = format!("//{}:{}", base_path, short_name);
    validate_base_path(base_path).map_err(|reason| MalformedTarget::new(&display, reason))?;
    validate_short_name(short_name).map_err(|reason| MalformedTarget::new(&display, reason))?;
    Ok(Self {
      base_path: base_path.to_string(),
      short_name: short_name.to_string(),
    })
  }

  /// Parse `//base:name`, or `:name` relative to `current_package`.
  pub fn parse(name: &str, current_package: Option<&str>) -> Result<Self, MalformedTarget> {
    let (base_path, short_name) = if let Some(rest) = name.strip_prefix("//") {
      rest
        .split_once(':')
        .ok_or_else(|| MalformedTarget::new(name, "missing `:` before the short name"))?
    } else if let Some(short) = name.strip_prefix(':') {
      let base = current_package
        .ok_or_else(|| MalformedTarget::new(name, "relative target used outside of a package"))?;
      (base, short)
    } else {
      return Err(MalformedTarget::new(name, "must start with `//` or `:`"));
    };

    validate_base_path(base_path).map_err(|reason| MalformedTarget::new(name, reason))?;
    validate_short_name(short_name).map_err(|reason| MalformedTarget::new(name, reason))?;

    Ok(Self {
      base_path: base_path.to_string(),
      short_name: short_name.to_string(),
    })
  }

  pub fn base_path(&self) -> &str {
    &self.base_path
  }

  pub fn short_name(&self) -> &str {
    &self.short_name
  }

  /// `//base_path:short_name`
  pub fn fully_qualified_name(&self) -> String {
    format!("//{}:{}", self.base_path, self.short_name)
  }

  /// The base path followed by `/`, or the empty string for the root package.
  pub fn base_path_with_slash(&self) -> String {
    if self.base_path.is_empty() {
      String::new()
    } else {
      format!("{}/", self.base_path)
    }
  }

  /// Path of the build file declaring this target, relative to the project root.
  pub fn build_file_path(&self) -> PathBuf {
    PathBuf::from(&self.base_path).join(BUILD_FILE_NAME)
  }
}

impl fmt::Display for BuildTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "//{}:{}", self.base_path, self.short_name)
  }
}

impl Ord for BuildTarget {
  fn cmp(&self, other: &Self) -> Ordering {
    self.fully_qualified_name().cmp(&other.fully_qualified_name())
  }
}

impl PartialOrd for BuildTarget {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

pub(crate) fn validate_base_path(base_path: &str) -> Result<(), &'static str> {
  if base_path.is_empty() {
    return Ok(());
  }
  if base_path.starts_with('/') || base_path.ends_with('/') {
    return Err("base path must not start or end with `/`");
  }
  for component in base_path.split('/') {
    match component {
      "" => return Err("base path contains an empty component"),
      "." | ".." => return Err("base path must not contain `.` or `..`"),
      c if c.contains(':') => return Err("base path must not contain `:`"),
      _ => {}
    }
  }
  Ok(())
}

fn validate_short_name(short_name: &str) -> Result<(), &'static str> {
  if short_name.is_empty() {
    return Err("short name is empty");
  }
  if short_name.contains(['/', ':']) {
    return Err("short name must not contain `/` or `:`");
  }
  if short_name.chars().any(char::is_whitespace) {
    return Err("short name must not contain whitespace");
  }
  Ok(())
}
