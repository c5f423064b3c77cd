use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::MutableDirectedGraph;
use crate::error::BuildError;
use crate::rules::BuildRule;
use crate::target::BuildTarget;

/// The rules of one invocation and the edges between them.
///
/// An edge `a -> b` means rule `a` depends on rule `b`.
#[derive(Debug, Default)]
pub struct DependencyGraph {
  graph: MutableDirectedGraph<BuildTarget>,
  rules: HashMap<BuildTarget, Arc<BuildRule>>,
  outputs: HashMap<PathBuf, BuildTarget>,
}

impl DependencyGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a rule whose dependencies are already in the graph.
  ///
  /// Fails if another rule already produces the same output path.
  pub fn add_rule(&mut self, rule: Arc<BuildRule>) -> Result<(), BuildError> {
    let target = rule.target().clone();
    if self.rules.contains_key(&target) {
      return Ok(());
    }
    for dep in rule.deps() {
      if !self.rules.contains_key(dep.target()) {
        return Err(BuildError::NoSuchBuildTarget {
          target: dep.target().clone(),
        });
      }
    }

    let output = rule.output_path();
    if let Some(path) = &output {
      if let Some(owner) = self.outputs.get(path) {
        return Err(BuildError::ConflictingOutputs {
          path: path.clone(),
          first: owner.clone(),
          second: target,
        });
      }
    }

    self.graph.add_node(target.clone());
    for dep in rule.deps() {
      self
        .graph
        .add_edge(&target, dep.target())
        .map_err(|e| BuildError::CycleDetected { path: e.path })?;
    }
    if let Some(path) = output {
      self.outputs.insert(path, target.clone());
    }
    self.rules.insert(target, rule);
    Ok(())
  }

  pub fn get(&self, target: &BuildTarget) -> Option<&Arc<BuildRule>> {
    self.rules.get(target)
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  /// All rules, sorted by target.
  pub fn rules(&self) -> Vec<&Arc<BuildRule>> {
    let mut rules: Vec<_> = self.rules.values().collect();
    rules.sort_by(|a, b| a.target().cmp(b.target()));
    rules
  }

  /// Rules that declare `target` as a dependency, sorted.
  pub fn dependents_of(&self, target: &BuildTarget) -> Vec<&BuildTarget> {
    self.graph.incoming(target)
  }

  fn lookup(&self, targets: Vec<BuildTarget>) -> Vec<Arc<BuildRule>> {
    targets.iter().filter_map(|t| self.rules.get(t)).cloned().collect()
  }

  /// Every rule, dependents before their dependencies.
  pub fn topological_order(&self) -> Vec<Arc<BuildRule>> {
    self.lookup(self.graph.topological_order())
  }

  /// Every rule, dependencies before their dependents.
  pub fn reverse_topological_order(&self) -> Vec<Arc<BuildRule>> {
    self.lookup(self.graph.reverse_topological_order())
  }

  /// The transitive closure of `roots`, each rule once, leaves first.
  pub fn postorder_from(&self, roots: &[BuildTarget]) -> Vec<Arc<BuildRule>> {
    self.lookup(self.graph.postorder_from(roots))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rules::{BuildRuleType, ExportFile};
  use std::collections::BTreeSet;

  fn rule(name: &str, deps: &[&Arc<BuildRule>]) -> Arc<BuildRule> {
    rule_with_out(name, None, deps)
  }

  fn rule_with_out(name: &str, out: Option<&str>, deps: &[&Arc<BuildRule>]) -> Arc<BuildRule> {
    let target = BuildTarget::parse(name, None).unwrap();
    let buildable = Arc::new(ExportFile::new(target.clone(), None, out.map(str::to_string)).unwrap());
    Arc::new(BuildRule::new(
      target,
      BuildRuleType::EXPORT_FILE,
      deps.iter().map(|d| Arc::clone(d)).collect(),
      vec![],
      BTreeSet::new(),
      buildable,
    ))
  }

  fn names(rules: &[Arc<BuildRule>]) -> Vec<String> {
    rules.iter().map(|r| r.target().to_string()).collect()
  }

  #[test]
  fn orders_and_closures() {
    let base = rule("//a:base", &[]);
    let lib = rule("//a:lib", &[&base]);
    let app = rule("//a:app", &[&lib]);
    let other = rule("//b:other", &[]);

    let mut graph = DependencyGraph::new();
    for r in [&base, &lib, &app, &other] {
      graph.add_rule(Arc::clone(r)).unwrap();
    }

    assert_eq!(graph.len(), 4);
    assert_eq!(names(&graph.postorder_from(&[app.target().clone()])), vec!["//a:base", "//a:lib", "//a:app"]);
    assert_eq!(
      names(&graph.reverse_topological_order()),
      vec!["//b:other", "//a:base", "//a:lib", "//a:app"]
    );
    assert_eq!(graph.dependents_of(base.target()), vec![lib.target()]);
  }

  #[test]
  fn dependency_must_be_added_first() {
    let base = rule("//a:base", &[]);
    let lib = rule("//a:lib", &[&base]);

    let mut graph = DependencyGraph::new();
    let err = graph.add_rule(lib).unwrap_err();
    assert!(matches!(err, BuildError::NoSuchBuildTarget { ref target } if target == base.target()));
  }

  #[test]
  fn shared_output_path_is_rejected() {
    let a = rule_with_out("//pkg:a", Some("same.txt"), &[]);
    let b = rule_with_out("//pkg:b", Some("same.txt"), &[]);

    let mut graph = DependencyGraph::new();
    graph.add_rule(a).unwrap();
    let err = graph.add_rule(b).unwrap_err();

    assert!(err.is_structural());
    assert_eq!(
      err.to_string(),
      "//pkg:a and //pkg:b both produce buck-out/gen/pkg/same.txt"
    );
    assert_eq!(graph.len(), 1);
  }
}
