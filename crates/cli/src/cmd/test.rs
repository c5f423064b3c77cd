//! Implementation of the `brick test` command.
//!
//! Builds the selected test rules, runs (or reuses) their tests and prints a
//! summary per test case. `--xml` also writes the results as an XML report.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use brick_lib::context::EventSink;
use brick_lib::testing::{
  TestOptions, TestResults, TestRun, coverage_source_folders, run_tests, select_test_rules, write_xml_report,
};
use brick_lib::target::{BuildTarget, BuildTargetPattern};

use super::build::print_summary;
use super::{BuildOptions, Project, parse_patterns, user_error};
use crate::output::{format_duration, print_error, print_info, print_stat, print_success, print_warning};

#[derive(Debug, Default)]
pub struct TestArgs {
  pub targets: Vec<String>,
  pub include: Vec<String>,
  pub exclude: Vec<String>,
  pub xml: Option<PathBuf>,
  pub code_coverage: bool,
  pub all: bool,
  pub build: BuildOptions,
}

/// Returns whether the build succeeded and every test passed.
pub fn cmd_test(project: &Project, args: &TestArgs) -> Result<bool> {
  let start = Instant::now();
  let patterns = parse_patterns(&args.targets)?;
  let explicit: Vec<BuildTarget> = patterns
    .iter()
    .filter_map(|p| match p {
      BuildTargetPattern::Single(target) => Some(target.clone()),
      _ => None,
    })
    .collect();

  let (graph, roots) = project.load_graph(&patterns)?;

  let default_excluded = project.config().default_excluded_labels();
  let options = TestOptions::new(
    default_excluded.iter().map(String::as_str),
    args.include.iter().map(String::as_str),
    args.exclude.iter().map(String::as_str),
  )
  .with_explicit_targets(explicit)
  .with_all(args.all);
  debug!(
    included = ?options.included_labels(),
    excluded = ?options.excluded_labels(),
    "selecting tests"
  );

  let in_scope: BTreeSet<&BuildTarget> = roots.iter().collect();
  let mut selected = select_test_rules(&graph, &options).map_err(user_error)?;
  selected.retain(|rule| in_scope.contains(rule.target()));

  if selected.is_empty() {
    print_warning("No tests selected");
    return Ok(true);
  }

  let test_targets: Vec<BuildTarget> = selected.iter().map(|r| r.target().clone()).collect();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt.block_on(project.build(&graph, &test_targets, &args.build))?;
  if !outcome.is_success() {
    print_summary(&outcome);
  }

  let runnable: Vec<_> = selected
    .iter()
    .filter(|rule| outcome.get(rule.target()).is_some_and(|o| o.is_success()))
    .map(Arc::clone)
    .collect();

  let ctx = project.context(args.build.debug, EventSink::default());
  let run = rt.block_on(run_tests(&runnable, &ctx));
  print_test_run(&run);

  if let Some(path) = &args.xml {
    let path = resolve_from_cwd(path)?;
    write_xml_report(&run.results, &path).map_err(|e| user_error(e.into()))?;
    print_info(&format!("Wrote XML report to {}", path.display()));
  }

  if args.code_coverage {
    let folders = coverage_source_folders(&runnable, &project.config().package_finder());
    print_info("Source folders for coverage:");
    for folder in &folders {
      println!("  {}", folder);
    }
  }

  print_stat("Time", format_duration(start.elapsed()));
  Ok(outcome.is_success() && run.is_success())
}

/// Relative paths given on the command line name files from where brick was
/// invoked, not from the project root.
fn resolve_from_cwd(path: &Path) -> Result<PathBuf> {
  if path.is_absolute() {
    return Ok(path.to_path_buf());
  }
  let cwd = std::env::current_dir().context("Failed to determine current directory")?;
  Ok(cwd.join(path))
}

fn print_test_run(run: &TestRun) {
  println!();
  for results in &run.results {
    print_results(results);
  }
  for error in &run.errors {
    print_error(&error.human_readable_message());
  }

  println!();
  print_stat("Passed", run.passes());
  print_stat("Failed", run.failures());
  if run.is_success() {
    print_success("TESTS PASSED");
  } else {
    print_error("TESTS FAILED");
  }
}

fn print_results(results: &TestResults) {
  for case in results.cases() {
    let line = format!(
      "{} {} ({} passed, {} failed, {})",
      results.target(),
      case.case_name,
      case.passes(),
      case.failures(),
      format_duration(std::time::Duration::from_millis(case.total_time_ms())),
    );
    if case.is_success() {
      print_success(&line);
      continue;
    }
    print_error(&line);
    for result in case.results.iter().filter(|r| !r.success) {
      eprintln!("    {}", result.test_name);
      if let Some(message) = &result.message {
        eprintln!("      {}", message);
      }
      if let Some(stacktrace) = &result.stacktrace {
        for line in stacktrace.lines() {
          eprintln!("      {}", line);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn relative_report_path_uses_working_directory() {
    let resolved = resolve_from_cwd(Path::new("reports/tests.xml")).unwrap();
    assert_eq!(resolved, std::env::current_dir().unwrap().join("reports/tests.xml"));
  }

  #[test]
  fn absolute_report_path_is_kept() {
    let absolute = std::env::temp_dir().join("tests.xml");
    assert_eq!(resolve_from_cwd(&absolute).unwrap(), absolute);
  }
}
