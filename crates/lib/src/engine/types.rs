//! Configuration and results of a build.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::BuildError;
use crate::rules::BuildRuleStatus;
use crate::target::BuildTarget;

/// How the engine schedules work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  /// Maximum number of rules running at once.
  pub parallelism: usize,
  /// Keep building unrelated rules after a failure. When `false`, the first
  /// failure stops new rules from starting.
  pub keep_going: bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      keep_going: true,
    }
  }
}

/// Number of CPUs available to this process, at least 1.
pub fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// What happened to one rule.
#[derive(Debug)]
pub enum RuleOutcome {
  Success {
    status: BuildRuleStatus,
    output: Option<PathBuf>,
  },
  Failure {
    status: BuildRuleStatus,
    error: BuildError,
  },
}

impl RuleOutcome {
  pub fn status(&self) -> BuildRuleStatus {
    match self {
      RuleOutcome::Success { status, .. } | RuleOutcome::Failure { status, .. } => *status,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, RuleOutcome::Success { .. })
  }

  pub fn output(&self) -> Option<&Path> {
    match self {
      RuleOutcome::Success { output, .. } => output.as_deref(),
      RuleOutcome::Failure { .. } => None,
    }
  }

  pub fn error(&self) -> Option<&BuildError> {
    match self {
      RuleOutcome::Success { .. } => None,
      RuleOutcome::Failure { error, .. } => Some(error),
    }
  }
}

/// Outcome of every rule in the closure of the requested roots.
#[derive(Debug, Default)]
pub struct BuildOutcome {
  roots: Vec<BuildTarget>,
  rules: BTreeMap<BuildTarget, RuleOutcome>,
}

impl BuildOutcome {
  pub(crate) fn new(roots: Vec<BuildTarget>, rules: BTreeMap<BuildTarget, RuleOutcome>) -> Self {
    Self { roots, rules }
  }

  pub fn get(&self, target: &BuildTarget) -> Option<&RuleOutcome> {
    self.rules.get(target)
  }

  /// Outcomes of the requested roots, in request order.
  pub fn root_outcomes(&self) -> impl Iterator<Item = (&BuildTarget, &RuleOutcome)> {
    self.roots.iter().filter_map(|t| self.rules.get(t).map(|o| (t, o)))
  }

  /// Every rule that took part, sorted by target.
  pub fn rules(&self) -> impl Iterator<Item = (&BuildTarget, &RuleOutcome)> {
    self.rules.iter()
  }

  pub fn is_success(&self) -> bool {
    self.rules.values().all(RuleOutcome::is_success)
  }

  /// Rules that failed themselves, not those skipped or cancelled.
  pub fn failures(&self) -> Vec<(&BuildTarget, &BuildError)> {
    self
      .rules
      .iter()
      .filter(|(_, o)| o.status() == BuildRuleStatus::Failed)
      .filter_map(|(t, o)| o.error().map(|e| (t, e)))
      .collect()
  }

  pub fn count(&self, status: BuildRuleStatus) -> usize {
    self.rules.values().filter(|o| o.status() == status).count()
  }
}
