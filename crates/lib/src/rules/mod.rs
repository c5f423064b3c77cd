//! Build rules and the buildables behind them.
//!
//! A [`BuildRule`] is one node of the dependency graph. What it actually does
//! lives in its [`Buildable`]: the inputs it reads, the steps it runs and the
//! path it produces. Concrete rule types are created by factories registered
//! in a [`RuleFactoryRegistry`].

mod export_file;
mod java;
mod registry;

pub use export_file::{ExportFile, ExportFileRuleFactory};
pub use java::{
  JavaLibrary, JavaLibraryRuleFactory, JavaOptions, JavaTest, JavaTestRuleFactory, RobolectricTestRuleFactory,
};
pub use registry::{AttrReader, BuildRuleResolver, RuleFactory, RuleFactoryRegistry, RuleParams, resolve_visible};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::fingerprint::Fingerprint;
use crate::step::Step;
use crate::target::{BuildTarget, BuildTargetPattern};

/// Tag naming a kind of rule, as written in build files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildRuleType {
  name: &'static str,
  is_test_rule: bool,
}

impl BuildRuleType {
  pub const EXPORT_FILE: BuildRuleType = BuildRuleType::new("export_file", false);
  pub const JAVA_LIBRARY: BuildRuleType = BuildRuleType::new("java_library", false);
  pub const JAVA_TEST: BuildRuleType = BuildRuleType::new("java_test", true);
  pub const ROBOLECTRIC_TEST: BuildRuleType = BuildRuleType::new("robolectric_test", true);

  pub const fn new(name: &'static str, is_test_rule: bool) -> Self {
    Self { name, is_test_rule }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn is_test_rule(&self) -> bool {
    self.is_test_rule
  }
}

impl fmt::Display for BuildRuleType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name)
  }
}

/// Terminal state of a rule after the engine ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildRuleStatus {
  BuiltLocally,
  FetchedFromCache,
  Failed,
  /// A dependency failed, so the rule never ran.
  Skipped,
  /// The build was cancelled before the rule could start.
  Cancelled,
}

impl BuildRuleStatus {
  pub fn is_success(&self) -> bool {
    matches!(self, BuildRuleStatus::BuiltLocally | BuildRuleStatus::FetchedFromCache)
  }
}

impl fmt::Display for BuildRuleStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      BuildRuleStatus::BuiltLocally => "BUILT",
      BuildRuleStatus::FetchedFromCache => "CACHED",
      BuildRuleStatus::Failed => "FAILED",
      BuildRuleStatus::Skipped => "SKIPPED",
      BuildRuleStatus::Cancelled => "CANCELLED",
    };
    f.write_str(s)
  }
}

/// Produces a rule's outputs.
pub trait Buildable: Send + Sync + fmt::Debug {
  /// Source files read by the steps, relative to the project root.
  fn inputs(&self) -> Vec<PathBuf>;

  /// Settings other than inputs that affect the output.
  fn constant_attributes(&self) -> BTreeMap<String, String> {
    BTreeMap::new()
  }

  /// Steps that produce the output, in execution order.
  fn steps(&self) -> Vec<Step>;

  /// The produced file, relative to the project root, if any.
  fn output_path(&self) -> Option<PathBuf>;

  fn as_test(&self) -> Option<&dyn TestBuildable> {
    None
  }

  fn as_java_library(&self) -> Option<&JavaLibrary> {
    None
  }
}

/// Extra capabilities of rules that run tests.
pub trait TestBuildable: Send + Sync {
  /// Directory the runner writes its result files into.
  fn test_output_dir(&self) -> PathBuf;

  /// Steps that run the tests after the rule is built.
  fn test_steps(&self) -> Vec<Step>;

  /// Source paths whose folders feed coverage reporting.
  fn coverage_sources(&self) -> BTreeSet<String> {
    BTreeSet::new()
  }
}

/// One node of the dependency graph.
pub struct BuildRule {
  target: BuildTarget,
  rule_type: BuildRuleType,
  deps: Vec<Arc<BuildRule>>,
  visibility: Vec<BuildTargetPattern>,
  labels: BTreeSet<String>,
  buildable: Arc<dyn Buildable>,
  fingerprint: OnceLock<Fingerprint>,
  status: OnceLock<BuildRuleStatus>,
}

impl BuildRule {
  /// Dependencies are deduplicated and kept sorted by target.
  pub fn new(
    target: BuildTarget,
    rule_type: BuildRuleType,
    mut deps: Vec<Arc<BuildRule>>,
    visibility: Vec<BuildTargetPattern>,
    labels: BTreeSet<String>,
    buildable: Arc<dyn Buildable>,
  ) -> Self {
    deps.sort_by(|a, b| a.target.cmp(&b.target));
    deps.dedup_by(|a, b| a.target == b.target);
    Self {
      target,
      rule_type,
      deps,
      visibility,
      labels,
      buildable,
      fingerprint: OnceLock::new(),
      status: OnceLock::new(),
    }
  }

  pub fn target(&self) -> &BuildTarget {
    &self.target
  }

  pub fn rule_type(&self) -> BuildRuleType {
    self.rule_type
  }

  pub fn deps(&self) -> &[Arc<BuildRule>] {
    &self.deps
  }

  pub fn visibility(&self) -> &[BuildTargetPattern] {
    &self.visibility
  }

  pub fn labels(&self) -> &BTreeSet<String> {
    &self.labels
  }

  pub fn buildable(&self) -> &dyn Buildable {
    self.buildable.as_ref()
  }

  pub fn is_test_rule(&self) -> bool {
    self.rule_type.is_test_rule() && self.buildable.as_test().is_some()
  }

  pub fn output_path(&self) -> Option<PathBuf> {
    self.buildable.output_path()
  }

  /// Fingerprint recorded by the engine, if this rule has been fingerprinted.
  pub fn fingerprint(&self) -> Option<&Fingerprint> {
    self.fingerprint.get()
  }

  /// Returns the stored fingerprint; a second call keeps the first value.
  pub fn record_fingerprint(&self, fingerprint: Fingerprint) -> &Fingerprint {
    self.fingerprint.get_or_init(|| fingerprint)
  }

  /// Status recorded by the engine, if this rule took part in a build.
  pub fn status(&self) -> Option<BuildRuleStatus> {
    self.status.get().copied()
  }

  pub fn record_status(&self, status: BuildRuleStatus) {
    if self.status.set(status).is_err() {
      tracing::debug!(target = %self.target, "status already recorded");
    }
  }
}

impl fmt::Debug for BuildRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BuildRule")
      .field("target", &self.target)
      .field("rule_type", &self.rule_type)
      .field("deps", &self.deps.iter().map(|d| d.target.to_string()).collect::<Vec<_>>())
      .field("labels", &self.labels)
      .finish()
  }
}

impl fmt::Display for BuildRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.target)
  }
}
