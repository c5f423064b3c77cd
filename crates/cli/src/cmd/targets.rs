//! Implementation of the `brick targets` command.

use anyhow::Result;

use super::{Project, parse_patterns};

/// Print the targets matched by `patterns`, optionally only those of the
/// given rule types.
pub fn cmd_targets(project: &Project, patterns: &[String], rule_types: &[String]) -> Result<()> {
  let patterns = parse_patterns(patterns)?;
  let (graph, roots) = project.load_graph(&patterns)?;

  for target in roots {
    let Some(rule) = graph.get(&target) else {
      continue;
    };
    if rule_types.is_empty() || rule_types.iter().any(|t| t == rule.rule_type().name()) {
      println!("{}", target);
    }
  }
  Ok(())
}
