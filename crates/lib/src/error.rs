//! Invocation-level errors.
//!
//! Module errors convert into [`BuildError`]. Structural errors abort an
//! invocation before anything runs; rule failures are recorded per rule and
//! never abort unrelated work.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::parser::BuildFileParseError;
use crate::step::StepError;
use crate::target::{BuildTarget, MalformedTarget};
use crate::testing::ReportError;
use crate::util::hash::HashError;

#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  MalformedTarget(#[from] MalformedTarget),

  #[error("no such build target: {target}")]
  NoSuchBuildTarget { target: BuildTarget },

  #[error("unknown rule type `{rule_type}` for {target}")]
  UnknownRuleType { rule_type: String, target: BuildTarget },

  #[error("{target}: unknown attribute `{attribute}` for rule type `{rule_type}`")]
  UnknownAttribute {
    target: BuildTarget,
    rule_type: String,
    attribute: String,
  },

  #[error("{target}: invalid attribute `{attribute}`: {message}")]
  InvalidAttribute {
    target: BuildTarget,
    attribute: String,
    message: String,
  },

  #[error(transparent)]
  BuildFileParse(#[from] BuildFileParseError),

  #[error("{dependent} depends on {dependency}, which is not visible to it")]
  VisibilityViolation {
    dependent: BuildTarget,
    dependency: BuildTarget,
  },

  #[error("dependency cycle detected: {}", format_path(.path))]
  CycleDetected { path: Vec<BuildTarget> },

  #[error("{first} and {second} both produce {}", .path.display())]
  ConflictingOutputs {
    path: PathBuf,
    first: BuildTarget,
    second: BuildTarget,
  },

  #[error("{rule} failed: {error}")]
  StepFailed {
    rule: BuildTarget,
    #[source]
    error: StepError,
  },

  #[error("{rule} was skipped because {dependency} failed")]
  DependencyFailed {
    rule: BuildTarget,
    dependency: BuildTarget,
  },

  #[error("{rule} was not started because the build was cancelled")]
  Cancelled { rule: BuildTarget },

  #[error("could not fingerprint {rule}: {source}")]
  Fingerprint {
    rule: BuildTarget,
    #[source]
    source: HashError,
  },

  #[error("could not read test results of {rule}: {message}")]
  TestResults { rule: BuildTarget, message: String },

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Report(#[from] ReportError),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("internal error: {0}")]
  Internal(String),
}

fn format_path(path: &[BuildTarget]) -> String {
  path.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ")
}

impl BuildError {
  /// Errors that make the target graph unusable.
  pub fn is_structural(&self) -> bool {
    matches!(
      self,
      BuildError::MalformedTarget(_)
        | BuildError::NoSuchBuildTarget { .. }
        | BuildError::UnknownRuleType { .. }
        | BuildError::UnknownAttribute { .. }
        | BuildError::InvalidAttribute { .. }
        | BuildError::BuildFileParse(_)
        | BuildError::VisibilityViolation { .. }
        | BuildError::CycleDetected { .. }
        | BuildError::ConflictingOutputs { .. }
    )
  }

  /// Message suitable for showing to a user as-is.
  pub fn human_readable_message(&self) -> String {
    match self {
      BuildError::BuildFileParse(e) => e.human_readable_message().to_string(),
      BuildError::StepFailed { rule, error } => {
        let mut message = format!("{} failed on step `{}`", rule, error.step());
        match (error, error.exit_code()) {
          (_, Some(code)) => message.push_str(&format!(" with exit code {}", code)),
          (StepError::TimedOut { timeout, .. }, None) => message.push_str(&format!(" after timing out ({:?})", timeout)),
          _ => {}
        }
        let tail = error.stderr_tail();
        if !tail.is_empty() {
          message.push('\n');
          message.push_str(&tail);
        }
        message
      }
      other => other.to_string(),
    }
  }
}
