//! Sub-command implementations and the project setup they share.

mod build;
mod targets;
mod test;

pub use build::cmd_build;
pub use targets::cmd_targets;
pub use test::{TestArgs, cmd_test};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::sync::mpsc::UnboundedReceiver;

use brick_lib::cache::ArtifactCache;
use brick_lib::config::ProjectConfig;
use brick_lib::context::{BuildEvent, EventSink, ExecutionContext, ProjectFilesystem};
use brick_lib::engine::{BuildEngine, BuildOutcome};
use brick_lib::error::BuildError;
use brick_lib::graph::{DependencyGraph, GraphBuilder};
use brick_lib::parser::LuaBuildFileParser;
use brick_lib::rules::{BuildRuleStatus, RuleFactoryRegistry};
use brick_lib::target::{BuildTarget, BuildTargetPattern};

use crate::output::print_rule_status;

/// Environment variables passed through to steps.
const PASSTHROUGH_ENV: &[&str] = &["PATH", "HOME", "JAVA_HOME", "LANG", "TMPDIR", "SYSTEMROOT"];

/// Pattern used when a command is given no targets.
pub const ALL_TARGETS: &str = "//...";

/// A project root with its configuration loaded.
pub struct Project {
  root: PathBuf,
  config: ProjectConfig,
}

impl Project {
  pub fn open(root: Option<&Path>) -> Result<Self> {
    let root = match root {
      Some(root) => root.to_path_buf(),
      None => std::env::current_dir().context("Failed to determine current directory")?,
    };
    let root = root
      .canonicalize()
      .with_context(|| format!("Project root does not exist: {}", root.display()))?;
    let config = ProjectConfig::load(&root).map_err(|e| anyhow!(BuildError::from(e).human_readable_message()))?;
    Ok(Self { root, config })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn config(&self) -> &ProjectConfig {
    &self.config
  }

  /// Parse build files for `patterns` and link the rules they reach.
  /// Returns the graph and the targets the patterns matched.
  pub fn load_graph(&self, patterns: &[BuildTargetPattern]) -> Result<(DependencyGraph, Vec<BuildTarget>)> {
    let parser = LuaBuildFileParser::new();
    let registry = RuleFactoryRegistry::with_builtin_rules(self.config.java_options());
    let mut builder = GraphBuilder::new(&self.root, &parser, &registry);
    let roots = builder.expand(patterns).map_err(user_error)?;
    let graph = builder.build(&roots).map_err(user_error)?;
    Ok((graph, roots))
  }

  fn engine(&self, threads: Option<usize>, fail_fast: bool) -> BuildEngine {
    let mut config = self.config.engine_config();
    if let Some(threads) = threads {
      config.parallelism = threads.max(1);
    }
    if fail_fast {
      config.keep_going = false;
    }
    let cache = self.config.cache_dir(&self.root).map(|dir| Arc::new(ArtifactCache::new(dir)));
    BuildEngine::new(config, cache)
  }

  pub fn context(&self, debug: bool, events: EventSink) -> Arc<ExecutionContext> {
    let env: BTreeMap<String, String> = PASSTHROUGH_ENV
      .iter()
      .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value)))
      .collect();
    Arc::new(ExecutionContext::new(ProjectFilesystem::new(&self.root), env, debug).with_events(events))
  }

  /// Build `roots`, printing each rule as it finishes.
  pub async fn build(
    &self,
    graph: &DependencyGraph,
    roots: &[BuildTarget],
    options: &BuildOptions,
  ) -> Result<BuildOutcome> {
    let engine = self.engine(options.threads, options.fail_fast);
    let (sink, rx) = EventSink::channel();
    let progress = tokio::spawn(print_progress(rx));

    let ctx = self.context(options.debug, sink);
    let outcome = engine.build(graph, roots, ctx).await.map_err(user_error)?;
    progress.await.context("Progress printer failed")?;
    Ok(outcome)
  }
}

/// Flags shared by commands that build.
#[derive(Debug, Default)]
pub struct BuildOptions {
  pub threads: Option<usize>,
  pub fail_fast: bool,
  pub debug: bool,
}

async fn print_progress(mut rx: UnboundedReceiver<BuildEvent>) {
  while let Some(event) = rx.recv().await {
    if let BuildEvent::RuleFinished { target, status } = event {
      if status != BuildRuleStatus::Skipped {
        print_rule_status(status, &target.to_string());
      }
    }
  }
}

/// Parse command-line patterns, defaulting to every target.
pub fn parse_patterns(args: &[String]) -> Result<Vec<BuildTargetPattern>> {
  if args.is_empty() {
    return Ok(vec![BuildTargetPattern::parse(ALL_TARGETS, None).map_err(|e| user_error(e.into()))?]);
  }
  args
    .iter()
    .map(|arg| BuildTargetPattern::parse(arg, None).map_err(|e| user_error(e.into())))
    .collect()
}

/// Turn a library error into one whose message is fit for the terminal.
pub fn user_error(e: BuildError) -> anyhow::Error {
  anyhow!(e.human_readable_message())
}
