//! Test orchestration.
//!
//! After the engine has built the requested rules, the orchestrator picks the
//! test rules to run from label filters and explicit targets, decides per
//! rule whether its previous results can be reused, runs the rest and
//! collects a [`TestResults`] for each.

pub mod report;
pub mod source_folders;
pub mod summary;

pub use report::{ReportError, write_xml_output, write_xml_report};
pub use source_folders::{PackageFinder, is_generated_file, source_folders};
pub use summary::{TestCaseSummary, TestResultSummary, TestResults, read_test_results};

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::consts::TEST_RESULT_EXTENSION;
use crate::context::{BuildEvent, ExecutionContext};
use crate::error::BuildError;
use crate::graph::DependencyGraph;
use crate::rules::{BuildRule, BuildRuleStatus};
use crate::step::{StepError, execute_step};
use crate::target::BuildTarget;

/// Which tests to run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestOptions {
  included_labels: BTreeSet<String>,
  excluded_labels: BTreeSet<String>,
  explicit_targets: BTreeSet<BuildTarget>,
  all: bool,
}

impl TestOptions {
  /// `default_excluded` comes from configuration. A label that is both
  /// included and excluded counts as included.
  pub fn new<'a>(
    default_excluded: impl IntoIterator<Item = &'a str>,
    include: impl IntoIterator<Item = &'a str>,
    exclude: impl IntoIterator<Item = &'a str>,
  ) -> Self {
    let included_labels: BTreeSet<String> = include.into_iter().map(str::to_string).collect();
    let excluded_labels = default_excluded
      .into_iter()
      .chain(exclude)
      .filter(|label| !included_labels.contains(*label))
      .map(str::to_string)
      .collect();
    Self {
      included_labels,
      excluded_labels,
      explicit_targets: BTreeSet::new(),
      all: false,
    }
  }

  pub fn with_explicit_targets(mut self, targets: impl IntoIterator<Item = BuildTarget>) -> Self {
    self.explicit_targets = targets.into_iter().collect();
    self
  }

  /// Run every test rule, ignoring label filters.
  pub fn with_all(mut self, all: bool) -> Self {
    self.all = all;
    self
  }

  pub fn included_labels(&self) -> &BTreeSet<String> {
    &self.included_labels
  }

  pub fn excluded_labels(&self) -> &BTreeSet<String> {
    &self.excluded_labels
  }

  pub fn explicit_targets(&self) -> &BTreeSet<BuildTarget> {
    &self.explicit_targets
  }

  pub fn is_explicit(&self, target: &BuildTarget) -> bool {
    self.explicit_targets.contains(target)
  }

  pub fn is_all(&self) -> bool {
    self.all
  }
}

/// Test rules of `graph` carrying at least one of `included` labels, or
/// every test rule when `included` is empty. Sorted by target.
pub fn candidate_rules_by_included_labels(
  graph: &DependencyGraph,
  included: &BTreeSet<String>,
) -> Vec<Arc<BuildRule>> {
  graph
    .rules()
    .into_iter()
    .filter(|rule| rule.is_test_rule())
    .filter(|rule| included.is_empty() || !rule.labels().is_disjoint(included))
    .cloned()
    .collect()
}

/// Drop rules whose labels are all excluded. Explicitly requested rules and
/// unlabelled rules always stay.
pub fn filter_test_rules(options: &TestOptions, rules: Vec<Arc<BuildRule>>) -> Vec<Arc<BuildRule>> {
  if options.all {
    return rules;
  }
  rules
    .into_iter()
    .filter(|rule| {
      if options.is_explicit(rule.target()) || rule.labels().is_empty() {
        return true;
      }
      let excluded = rule.labels().is_subset(&options.excluded_labels);
      if excluded {
        debug!(target = %rule.target(), "test excluded by label");
      }
      !excluded
    })
    .collect()
}

/// The test rules to run: the explicit targets if any were given, otherwise
/// the label-selected candidates, then the exclude filter.
pub fn select_test_rules(graph: &DependencyGraph, options: &TestOptions) -> Result<Vec<Arc<BuildRule>>, BuildError> {
  let candidates = if options.explicit_targets.is_empty() {
    let included = if options.all {
      BTreeSet::new()
    } else {
      options.included_labels.clone()
    };
    candidate_rules_by_included_labels(graph, &included)
  } else {
    let mut rules = Vec::new();
    for target in &options.explicit_targets {
      let rule = graph.get(target).ok_or_else(|| BuildError::NoSuchBuildTarget {
        target: target.clone(),
      })?;
      if rule.is_test_rule() {
        rules.push(Arc::clone(rule));
      } else {
        warn!(target = %target, rule_type = %rule.rule_type(), "not a test rule, ignoring");
      }
    }
    rules
  };
  Ok(filter_test_rules(options, candidates))
}

/// Whether the test output directory of `rule` holds result files from an
/// earlier run.
pub fn has_test_result_files(rule: &BuildRule, ctx: &ExecutionContext) -> bool {
  let Some(test) = rule.buildable().as_test() else {
    return false;
  };
  let dir = ctx.filesystem().resolve(test.test_output_dir());
  let Ok(entries) = std::fs::read_dir(dir) else {
    return false;
  };
  entries
    .flatten()
    .any(|entry| entry.path().extension().is_some_and(|ext| ext == TEST_RESULT_EXTENSION))
}

/// Whether `rule`'s tests must run again rather than reuse persisted results.
pub fn is_test_run_required(rule: &BuildRule, ctx: &ExecutionContext) -> bool {
  if ctx.is_debug_enabled() {
    return true;
  }
  match rule.status() {
    Some(BuildRuleStatus::BuiltLocally) => true,
    Some(BuildRuleStatus::FetchedFromCache) => !has_test_result_files(rule, ctx),
    _ => false,
  }
}

/// Results of a test run.
#[derive(Debug, Default)]
pub struct TestRun {
  /// One entry per rule whose results could be collected, in run order.
  pub results: Vec<TestResults>,
  /// Rules whose tests could not be run or read.
  pub errors: Vec<BuildError>,
}

impl TestRun {
  pub fn is_success(&self) -> bool {
    self.errors.is_empty() && self.results.iter().all(TestResults::is_success)
  }

  pub fn passes(&self) -> usize {
    self.results.iter().map(TestResults::passes).sum()
  }

  pub fn failures(&self) -> usize {
    self.results.iter().map(TestResults::failures).sum()
  }
}

/// Run or reuse the tests of `rules`, one rule at a time in the given order.
///
/// A failure of one rule is recorded in [`TestRun::errors`] and does not stop
/// the others.
pub async fn run_tests(rules: &[Arc<BuildRule>], ctx: &ExecutionContext) -> TestRun {
  let mut run = TestRun::default();
  for rule in rules {
    match run_rule_tests(rule, ctx).await {
      Ok(results) => {
        ctx.events().emit(BuildEvent::TestsFinished {
          target: rule.target().clone(),
          passed: results.is_success(),
        });
        run.results.push(results);
      }
      Err(e) => {
        ctx.events().emit(BuildEvent::TestsFinished {
          target: rule.target().clone(),
          passed: false,
        });
        run.errors.push(e);
      }
    }
  }
  info!(
    rules = rules.len(),
    passed = run.passes(),
    failed = run.failures(),
    errors = run.errors.len(),
    "tests finished"
  );
  run
}

async fn run_rule_tests(rule: &BuildRule, ctx: &ExecutionContext) -> Result<TestResults, BuildError> {
  let target = rule.target();
  let Some(test) = rule.buildable().as_test() else {
    return Err(BuildError::TestResults {
      rule: target.clone(),
      message: format!("{} rules do not run tests", rule.rule_type()),
    });
  };
  let output_dir = test.test_output_dir();

  if is_test_run_required(rule, ctx) {
    ctx.events().emit(BuildEvent::TestsStarted { target: target.clone() });
    info!(target = %target, "running tests");
    for step in test.test_steps() {
      match execute_step(&step, target, ctx).await {
        Ok(()) => {}
        // Runners exit non-zero when a test fails; the result files say which.
        Err(StepError::Exited { .. }) if has_test_result_files(rule, ctx) => {
          debug!(target = %target, "test runner reported failures");
          break;
        }
        Err(error) => {
          return Err(BuildError::StepFailed {
            rule: target.clone(),
            error,
          });
        }
      }
    }
  } else {
    info!(target = %target, "reusing previous test results");
  }

  let results = read_test_results(ctx.filesystem(), target, &output_dir).await?;
  if results.cases().is_empty() {
    return Err(BuildError::TestResults {
      rule: target.clone(),
      message: format!("no test results in {}", output_dir.display()),
    });
  }
  Ok(results)
}

/// Source folders of the code exercised by `rules`, for coverage tools.
pub fn coverage_source_folders(rules: &[Arc<BuildRule>], finder: &PackageFinder) -> BTreeSet<String> {
  rules
    .iter()
    .filter_map(|rule| rule.buildable().as_test())
    .flat_map(|test| source_folders(test.coverage_sources().iter().map(String::as_str), finder))
    .collect()
}
