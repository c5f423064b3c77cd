use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::DependencyGraph;
use crate::error::BuildError;
use crate::parser::{BuildFileParser, RawRecord, find_packages};
use crate::rules::{BuildRule, BuildRuleResolver, RuleFactoryRegistry};
use crate::target::{BuildTarget, BuildTargetPattern};

/// Parses build files on demand and lowers their records into a
/// [`DependencyGraph`].
pub struct GraphBuilder<'a> {
  project_root: PathBuf,
  parser: &'a dyn BuildFileParser,
  registry: &'a RuleFactoryRegistry,
  packages: HashMap<String, BTreeMap<String, RawRecord>>,
  in_progress: Vec<BuildTarget>,
  graph: DependencyGraph,
}

impl<'a> GraphBuilder<'a> {
  pub fn new(project_root: &Path, parser: &'a dyn BuildFileParser, registry: &'a RuleFactoryRegistry) -> Self {
    Self {
      project_root: project_root.to_path_buf(),
      parser,
      registry,
      packages: HashMap::new(),
      in_progress: Vec::new(),
      graph: DependencyGraph::new(),
    }
  }

  fn package(&mut self, base_path: &str) -> Result<&BTreeMap<String, RawRecord>, BuildError> {
    if !self.packages.contains_key(base_path) {
      let records = self.parser.parse_package(&self.project_root, base_path)?;
      debug!(package = %base_path, rules = records.len(), "parsed package");
      let by_name = records
        .into_iter()
        .map(|r| (r.target.short_name().to_string(), r))
        .collect();
      self.packages.insert(base_path.to_string(), by_name);
    }
    self
      .packages
      .get(base_path)
      .ok_or_else(|| BuildError::Internal(format!("package {} vanished", base_path)))
  }

  /// Expand patterns into concrete targets, sorted and deduplicated.
  pub fn expand(&mut self, patterns: &[BuildTargetPattern]) -> Result<Vec<BuildTarget>, BuildError> {
    let mut targets = Vec::new();
    for pattern in patterns {
      match pattern {
        BuildTargetPattern::Single(target) => targets.push(target.clone()),
        _ => {
          for base_path in find_packages(&self.project_root, pattern)? {
            let records = self.package(&base_path)?;
            targets.extend(records.values().map(|r| r.target.clone()).filter(|t| pattern.matches(t)));
          }
        }
      }
    }
    targets.sort();
    targets.dedup();
    Ok(targets)
  }

  /// Resolve `roots` and everything they depend on.
  pub fn build(mut self, roots: &[BuildTarget]) -> Result<DependencyGraph, BuildError> {
    for root in roots {
      self.resolve(root)?;
    }
    info!(rules = self.graph.len(), "dependency graph built");
    Ok(self.graph)
  }
}

impl BuildRuleResolver for GraphBuilder<'_> {
  fn resolve(&mut self, target: &BuildTarget) -> Result<Arc<BuildRule>, BuildError> {
    if let Some(rule) = self.graph.get(target) {
      return Ok(Arc::clone(rule));
    }

    if let Some(pos) = self.in_progress.iter().position(|t| t == target) {
      let mut path = self.in_progress[pos..].to_vec();
      path.push(target.clone());
      return Err(BuildError::CycleDetected { path });
    }

    let record = self
      .package(target.base_path())?
      .get(target.short_name())
      .cloned()
      .ok_or_else(|| BuildError::NoSuchBuildTarget { target: target.clone() })?;

    self.in_progress.push(target.clone());
    let registry = self.registry;
    let created = registry.create_rule(&record, self);
    self.in_progress.pop();

    let rule = Arc::new(created?);
    self.graph.add_rule(Arc::clone(&rule))?;
    Ok(rule)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::LuaBuildFileParser;
  use crate::rules::JavaOptions;
  use std::fs;
  use tempfile::TempDir;

  fn write(root: &Path, base_path: &str, content: &str) {
    let dir = root.join(base_path);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("BUCK"), content).unwrap();
  }

  fn target(name: &str) -> BuildTarget {
    BuildTarget::parse(name, None).unwrap()
  }

  fn build(root: &Path, roots: &[&str]) -> Result<DependencyGraph, BuildError> {
    let parser = LuaBuildFileParser::new();
    let registry = RuleFactoryRegistry::with_builtin_rules(JavaOptions::default());
    let roots: Vec<_> = roots.iter().map(|r| target(r)).collect();
    GraphBuilder::new(root, &parser, &registry).build(&roots)
  }

  #[test]
  fn follows_dependencies_across_packages() {
    let temp = TempDir::new().unwrap();
    write(
      temp.path(),
      "lib",
      r#"java_library { name = "util", srcs = { "Util.java" }, visibility = { "//app/..." } }"#,
    );
    write(
      temp.path(),
      "app",
      r#"java_library { name = "main", srcs = { "Main.java" }, deps = { "//lib:util" } }"#,
    );

    let graph = build(temp.path(), &["//app:main"]).unwrap();
    assert_eq!(graph.len(), 2);
    let order: Vec<_> = graph
      .postorder_from(&[target("//app:main")])
      .iter()
      .map(|r| r.target().to_string())
      .collect();
    assert_eq!(order, vec!["//lib:util", "//app:main"]);
  }

  #[test]
  fn reports_cycle_with_witness_path() {
    let temp = TempDir::new().unwrap();
    write(
      temp.path(),
      "a",
      r#"
        java_library { name = "a", deps = { "//b:b" }, visibility = { "PUBLIC" } }
      "#,
    );
    write(
      temp.path(),
      "b",
      r#"
        java_library { name = "b", deps = { ":c" }, visibility = { "PUBLIC" } }
        java_library { name = "c", deps = { "//a:a" } }
      "#,
    );

    let err = build(temp.path(), &["//a:a"]).unwrap_err();
    match err {
      BuildError::CycleDetected { path } => {
        let path: Vec<_> = path.iter().map(ToString::to_string).collect();
        assert_eq!(path, vec!["//a:a", "//b:b", "//b:c", "//a:a"]);
      }
      other => panic!("expected a cycle, got {other}"),
    }
  }

  #[test]
  fn missing_target_in_existing_package() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "a", r#"export_file { name = "x" }"#);
    let err = build(temp.path(), &["//a:y"]).unwrap_err();
    assert_eq!(err.to_string(), "no such build target: //a:y");
  }

  #[test]
  fn visibility_violation_is_fatal() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "lib", r#"java_library { name = "private" }"#);
    write(temp.path(), "app", r#"java_library { name = "main", deps = { "//lib:private" } }"#);
    let err = build(temp.path(), &["//app:main"]).unwrap_err();
    assert!(matches!(err, BuildError::VisibilityViolation { .. }));
    assert!(err.is_structural());
  }

  #[test]
  fn rules_may_not_share_an_output() {
    let temp = TempDir::new().unwrap();
    write(
      temp.path(),
      "pkg",
      r#"
        export_file { name = "a", src = "a.txt", out = "same.txt" }
        export_file { name = "b", src = "b.txt", out = "same.txt" }
      "#,
    );

    let err = build(temp.path(), &["//pkg:a", "//pkg:b"]).unwrap_err();
    match &err {
      BuildError::ConflictingOutputs { path, first, second } => {
        assert_eq!(path, &PathBuf::from("buck-out/gen/pkg/same.txt"));
        assert_eq!(first, &target("//pkg:a"));
        assert_eq!(second, &target("//pkg:b"));
      }
      other => panic!("expected conflicting outputs, got {other}"),
    }
    assert!(err.is_structural());
  }

  #[test]
  fn expand_patterns() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "", r#"export_file { name = "README" }"#);
    write(
      temp.path(),
      "java/a",
      r#"export_file { name = "one" } export_file { name = "two" }"#,
    );
    write(temp.path(), "java/b", r#"export_file { name = "three" }"#);

    let parser = LuaBuildFileParser::new();
    let registry = RuleFactoryRegistry::with_builtin_rules(JavaOptions::default());
    let mut builder = GraphBuilder::new(temp.path(), &parser, &registry);

    let all = builder
      .expand(&[BuildTargetPattern::parse("//...", None).unwrap()])
      .unwrap();
    let names: Vec<_> = all.iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["//:README", "//java/a:one", "//java/a:two", "//java/b:three"]);

    let pkg = builder
      .expand(&[
        BuildTargetPattern::parse("//java/a:", None).unwrap(),
        BuildTargetPattern::parse("//java/a:one", None).unwrap(),
      ])
      .unwrap();
    assert_eq!(pkg.len(), 2);
  }
}
