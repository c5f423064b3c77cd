//! The build engine.
//!
//! Rules run once all their dependencies succeeded. Ready rules are started
//! smallest target first, at most `parallelism` at a time. Before running a
//! rule's steps the engine fingerprints it and asks the artifact cache; a hit
//! restores the outputs instead. A failure marks every dependent as skipped
//! and leaves unrelated rules alone.

mod types;

pub use types::{BuildOutcome, EngineConfig, RuleOutcome, num_cpus};

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, warn};

use crate::cache::{ArtifactCache, ArtifactManifest, CacheError};
use crate::context::{BuildEvent, ExecutionContext};
use crate::error::BuildError;
use crate::fingerprint::{Fingerprint, compute_fingerprint};
use crate::graph::DependencyGraph;
use crate::rules::{BuildRule, BuildRuleStatus};
use crate::step::execute_step;
use crate::target::BuildTarget;

pub struct BuildEngine {
  config: EngineConfig,
  cache: Option<Arc<ArtifactCache>>,
}

impl BuildEngine {
  pub fn new(config: EngineConfig, cache: Option<Arc<ArtifactCache>>) -> Self {
    Self { config, cache }
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  /// Build `roots` and everything they depend on.
  ///
  /// Rule failures are reported in the returned [`BuildOutcome`]. An `Err` is
  /// returned only if a root is not in the graph or a build task panicked.
  pub async fn build(
    &self,
    graph: &DependencyGraph,
    roots: &[BuildTarget],
    ctx: Arc<ExecutionContext>,
  ) -> Result<BuildOutcome, BuildError> {
    for root in roots {
      if graph.get(root).is_none() {
        return Err(BuildError::NoSuchBuildTarget { target: root.clone() });
      }
    }

    let closure = graph.postorder_from(roots);
    let mut remaining: HashMap<BuildTarget, usize> = HashMap::new();
    let mut dependents: HashMap<BuildTarget, Vec<Arc<BuildRule>>> = HashMap::new();
    let mut ready: BTreeMap<BuildTarget, Arc<BuildRule>> = BTreeMap::new();

    for rule in &closure {
      remaining.insert(rule.target().clone(), rule.deps().len());
      for dep in rule.deps() {
        dependents.entry(dep.target().clone()).or_default().push(Arc::clone(rule));
      }
      if rule.deps().is_empty() {
        ready.insert(rule.target().clone(), Arc::clone(rule));
      }
    }

    info!(rules = closure.len(), parallelism = self.config.parallelism, "starting build");

    let parallelism = self.config.parallelism.max(1);
    let mut outcomes: BTreeMap<BuildTarget, RuleOutcome> = BTreeMap::new();
    let mut running = JoinSet::new();
    let mut cancelled = false;

    loop {
      while !cancelled && running.len() < parallelism {
        let Some((_, rule)) = ready.pop_first() else {
          break;
        };
        let cache = self.cache.clone();
        let ctx = Arc::clone(&ctx);
        running.spawn(
          async move {
            let target = rule.target().clone();
            let outcome = build_rule(rule, cache, ctx).await;
            (target, outcome)
          }
          .in_current_span(),
        );
      }

      let Some(joined) = running.join_next().await else {
        break;
      };
      let (target, outcome) = joined.map_err(|e| BuildError::Internal(format!("build task failed: {}", e)))?;

      if outcome.is_success() {
        for dependent in dependents.get(&target).map(Vec::as_slice).unwrap_or_default() {
          let Some(count) = remaining.get_mut(dependent.target()) else {
            continue;
          };
          *count -= 1;
          if *count == 0 && !outcomes.contains_key(dependent.target()) {
            ready.insert(dependent.target().clone(), Arc::clone(dependent));
          }
        }
      } else {
        skip_dependents(&target, &dependents, &mut outcomes, &ctx);
        if !self.config.keep_going && !cancelled {
          warn!(target = %target, "stopping build after failure");
          cancelled = true;
        }
      }
      outcomes.insert(target, outcome);
    }

    for rule in &closure {
      if !outcomes.contains_key(rule.target()) {
        rule.record_status(BuildRuleStatus::Cancelled);
        outcomes.insert(
          rule.target().clone(),
          RuleOutcome::Failure {
            status: BuildRuleStatus::Cancelled,
            error: BuildError::Cancelled {
              rule: rule.target().clone(),
            },
          },
        );
      }
    }

    let outcome = BuildOutcome::new(roots.to_vec(), outcomes);
    info!(
      built = outcome.count(BuildRuleStatus::BuiltLocally),
      cached = outcome.count(BuildRuleStatus::FetchedFromCache),
      failed = outcome.count(BuildRuleStatus::Failed),
      skipped = outcome.count(BuildRuleStatus::Skipped),
      "build finished"
    );
    Ok(outcome)
  }
}

/// Mark everything that transitively depends on `failed` as skipped.
fn skip_dependents(
  failed: &BuildTarget,
  dependents: &HashMap<BuildTarget, Vec<Arc<BuildRule>>>,
  outcomes: &mut BTreeMap<BuildTarget, RuleOutcome>,
  ctx: &ExecutionContext,
) {
  let mut queue = VecDeque::from([failed.clone()]);
  let mut seen = HashSet::new();
  while let Some(current) = queue.pop_front() {
    for dependent in dependents.get(&current).map(Vec::as_slice).unwrap_or_default() {
      let target = dependent.target();
      if !seen.insert(target.clone()) || outcomes.contains_key(target) {
        continue;
      }
      warn!(target = %target, failed = %failed, "skipping rule, dependency failed");
      dependent.record_status(BuildRuleStatus::Skipped);
      ctx.events().emit(BuildEvent::RuleFinished {
        target: target.clone(),
        status: BuildRuleStatus::Skipped,
      });
      outcomes.insert(
        target.clone(),
        RuleOutcome::Failure {
          status: BuildRuleStatus::Skipped,
          error: BuildError::DependencyFailed {
            rule: target.clone(),
            dependency: failed.clone(),
          },
        },
      );
      queue.push_back(target.clone());
    }
  }
}

async fn build_rule(rule: Arc<BuildRule>, cache: Option<Arc<ArtifactCache>>, ctx: Arc<ExecutionContext>) -> RuleOutcome {
  let target = rule.target().clone();
  ctx.events().emit(BuildEvent::RuleStarted { target: target.clone() });
  debug!(target = %target, rule_type = %rule.rule_type(), "rule started");

  let outcome = match try_build_rule(&rule, cache, &ctx).await {
    Ok((status, output)) => {
      info!(target = %target, status = %status, "rule finished");
      RuleOutcome::Success { status, output }
    }
    Err(e) => {
      error!(target = %target, error = %e, "rule failed");
      RuleOutcome::Failure {
        status: BuildRuleStatus::Failed,
        error: e,
      }
    }
  };

  rule.record_status(outcome.status());
  ctx.events().emit(BuildEvent::RuleFinished {
    target,
    status: outcome.status(),
  });
  outcome
}

async fn try_build_rule(
  rule: &Arc<BuildRule>,
  cache: Option<Arc<ArtifactCache>>,
  ctx: &ExecutionContext,
) -> Result<(BuildRuleStatus, Option<PathBuf>), BuildError> {
  let target = rule.target();
  let root = ctx.filesystem().root().to_path_buf();

  let fingerprint = fingerprint_rule(Arc::clone(rule), root.clone()).await?;
  let fingerprint = rule.record_fingerprint(fingerprint).clone();
  debug!(target = %target, fingerprint = %fingerprint, "fingerprinted");

  if let Some(cache) = &cache {
    match fetch_from_cache(Arc::clone(cache), fingerprint.clone(), root.clone()).await {
      Ok(true) => return Ok((BuildRuleStatus::FetchedFromCache, rule.output_path())),
      Ok(false) => debug!(target = %target, "cache miss"),
      Err(e) => warn!(target = %target, error = %e, "cache read failed, building locally"),
    }
  }

  for step in rule.buildable().steps() {
    execute_step(&step, target, ctx)
      .await
      .map_err(|error| BuildError::StepFailed {
        rule: target.clone(),
        error,
      })?;
  }

  let output = rule.output_path();
  if let Some(path) = &output {
    if !ctx.filesystem().exists(path) {
      return Err(BuildError::Internal(format!(
        "{} did not produce its output {}",
        target,
        path.display()
      )));
    }
  }

  if let Some(cache) = cache {
    let outputs: Vec<PathBuf> = output.iter().cloned().collect();
    if let Err(e) = store_in_cache(cache, fingerprint, outputs, root).await {
      warn!(target = %target, error = %e, "failed to store artifacts in cache");
    }
  }

  Ok((BuildRuleStatus::BuiltLocally, output))
}

/// Hashes the rule's inputs on the blocking pool.
async fn fingerprint_rule(rule: Arc<BuildRule>, root: PathBuf) -> Result<Fingerprint, BuildError> {
  let deps: Vec<Fingerprint> = rule.deps().iter().filter_map(|d| d.fingerprint().cloned()).collect();
  if deps.len() != rule.deps().len() {
    return Err(BuildError::Internal(format!(
      "{} scheduled before its dependencies",
      rule.target()
    )));
  }

  let target = rule.target().clone();
  tokio::task::spawn_blocking(move || {
    let deps: Vec<&Fingerprint> = deps.iter().collect();
    compute_fingerprint(&rule, &deps, &root)
  })
  .await
  .map_err(|e| BuildError::Internal(format!("fingerprint task failed: {}", e)))?
  .map_err(|source| BuildError::Fingerprint { rule: target, source })
}

async fn fetch_from_cache(cache: Arc<ArtifactCache>, fingerprint: Fingerprint, root: PathBuf) -> Result<bool, CacheError> {
  blocking(move || match cache.get(&fingerprint)? {
    Some(manifest) => {
      cache.materialize(&manifest, &root)?;
      Ok(true)
    }
    None => Ok(false),
  })
  .await
}

async fn store_in_cache(
  cache: Arc<ArtifactCache>,
  fingerprint: Fingerprint,
  outputs: Vec<PathBuf>,
  root: PathBuf,
) -> Result<bool, CacheError> {
  blocking(move || {
    let manifest = ArtifactManifest::from_outputs(&root, &outputs)?;
    cache.put(&fingerprint, &manifest, &root)
  })
  .await
}

async fn blocking<T, F>(f: F) -> Result<T, CacheError>
where
  F: FnOnce() -> Result<T, CacheError> + Send + 'static,
  T: Send + 'static,
{
  tokio::task::spawn_blocking(f).await.map_err(|e| CacheError::Io {
    path: String::new(),
    source: std::io::Error::other(e.to_string()),
  })?
}
