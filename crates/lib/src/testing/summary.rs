//! Test result model shared by runners, the orchestrator and reports.
//!
//! Runners persist one [`TestCaseSummary`] per JSON file in the rule's test
//! output directory.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::TEST_RESULT_EXTENSION;
use crate::context::ProjectFilesystem;
use crate::error::BuildError;
use crate::target::BuildTarget;

/// Outcome of a single test method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResultSummary {
  pub case_name: String,
  pub test_name: String,
  pub success: bool,
  pub time_ms: u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stacktrace: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stdout: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stderr: Option<String>,
}

impl TestResultSummary {
  pub fn passed(case_name: &str, test_name: &str, time_ms: u64) -> Self {
    Self {
      case_name: case_name.to_string(),
      test_name: test_name.to_string(),
      success: true,
      time_ms,
      message: None,
      stacktrace: None,
      stdout: None,
      stderr: None,
    }
  }

  pub fn failed(
    case_name: &str,
    test_name: &str,
    time_ms: u64,
    message: Option<&str>,
    stacktrace: Option<&str>,
  ) -> Self {
    Self {
      success: false,
      message: message.map(str::to_string),
      stacktrace: stacktrace.map(str::to_string),
      ..Self::passed(case_name, test_name, time_ms)
    }
  }
}

/// All results of one test class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseSummary {
  pub case_name: String,
  pub results: Vec<TestResultSummary>,
}

impl TestCaseSummary {
  pub fn new(case_name: impl Into<String>, results: Vec<TestResultSummary>) -> Self {
    Self {
      case_name: case_name.into(),
      results,
    }
  }

  pub fn passes(&self) -> usize {
    self.results.iter().filter(|r| r.success).count()
  }

  pub fn failures(&self) -> usize {
    self.results.len() - self.passes()
  }

  pub fn is_success(&self) -> bool {
    self.failures() == 0
  }

  pub fn total_time_ms(&self) -> u64 {
    self.results.iter().map(|r| r.time_ms).sum()
  }
}

/// Results of every test case run by one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResults {
  target: BuildTarget,
  cases: Vec<TestCaseSummary>,
}

impl TestResults {
  pub fn new(target: BuildTarget, cases: Vec<TestCaseSummary>) -> Self {
    Self { target, cases }
  }

  pub fn target(&self) -> &BuildTarget {
    &self.target
  }

  pub fn cases(&self) -> &[TestCaseSummary] {
    &self.cases
  }

  pub fn passes(&self) -> usize {
    self.cases.iter().map(TestCaseSummary::passes).sum()
  }

  pub fn failures(&self) -> usize {
    self.cases.iter().map(TestCaseSummary::failures).sum()
  }

  pub fn is_success(&self) -> bool {
    self.cases.iter().all(TestCaseSummary::is_success)
  }
}

/// Read the case summaries a runner left in `dir`, ordered by file name.
///
/// A missing directory reads as no cases.
pub async fn read_test_results(
  fs: &ProjectFilesystem,
  target: &BuildTarget,
  dir: &Path,
) -> Result<TestResults, BuildError> {
  let fail = |message: String| BuildError::TestResults {
    rule: target.clone(),
    message,
  };
  let files = fs
    .files_with_extension(dir, TEST_RESULT_EXTENSION)
    .await
    .map_err(|e| fail(format!("cannot list {}: {}", dir.display(), e)))?;

  let mut cases = Vec::with_capacity(files.len());
  for file in files {
    let bytes = fs
      .read(&file)
      .await
      .map_err(|e| fail(format!("cannot read {}: {}", file.display(), e)))?;
    let case: TestCaseSummary = serde_json::from_slice(&bytes)
      .map_err(|e| fail(format!("malformed test result {}: {}", file.display(), e)))?;
    cases.push(case);
  }
  Ok(TestResults::new(target.clone(), cases))
}
