//! Implementation of the `brick build` command.

use std::time::Instant;

use anyhow::{Context, Result};

use brick_lib::engine::BuildOutcome;
use brick_lib::rules::BuildRuleStatus;

use super::{BuildOptions, Project, parse_patterns};
use crate::output::{format_duration, print_error, print_stat, print_success};

/// Build the targets matched by `targets` and everything they depend on.
///
/// Returns whether every rule succeeded.
pub fn cmd_build(project: &Project, targets: &[String], options: &BuildOptions) -> Result<bool> {
  let patterns = parse_patterns(targets)?;
  let (graph, roots) = project.load_graph(&patterns)?;

  let start = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt.block_on(project.build(&graph, &roots, options))?;

  print_summary(&outcome);
  print_stat("Time", format_duration(start.elapsed()));
  Ok(outcome.is_success())
}

pub(super) fn print_summary(outcome: &BuildOutcome) {
  println!();
  for (target, error) in outcome.failures() {
    print_error(&format!("{}: {}", target, error.human_readable_message()));
  }
  if outcome.is_success() {
    for (target, result) in outcome.root_outcomes() {
      match result.output() {
        Some(path) => print_success(&format!("{} -> {}", target, path.display())),
        None => print_success(&target.to_string()),
      }
    }
  }
  print_stat("Built", outcome.count(BuildRuleStatus::BuiltLocally));
  print_stat("Cached", outcome.count(BuildRuleStatus::FetchedFromCache));
  let failed = outcome.count(BuildRuleStatus::Failed);
  if failed > 0 {
    print_stat("Failed", failed);
    print_stat("Skipped", outcome.count(BuildRuleStatus::Skipped));
    print_stat("Cancelled", outcome.count(BuildRuleStatus::Cancelled));
  }
}
