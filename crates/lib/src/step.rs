//! Steps: the unit of work a rule hands to the engine.
//!
//! A [`Step`] is a plain description; [`execute_step`] performs it against an
//! [`ExecutionContext`]. Paths inside steps are relative to the project root.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::consts::STDERR_TAIL_LINES;
use crate::context::{BuildEvent, ExecutionContext};
use crate::target::BuildTarget;

/// Run an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecStep {
  pub argv: Vec<String>,
  /// Added on top of the context environment.
  pub env: BTreeMap<String, String>,
  /// Working directory, relative to the project root. Defaults to the root.
  pub cwd: Option<PathBuf>,
  pub timeout: Option<Duration>,
}

impl ExecStep {
  pub fn new(argv: Vec<String>) -> Self {
    Self {
      argv,
      env: BTreeMap::new(),
      cwd: None,
      timeout: None,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
  Mkdir { path: PathBuf },
  /// Delete the directory if it exists and create it empty.
  MakeCleanDir { path: PathBuf },
  Copy { from: PathBuf, to: PathBuf },
  Exec(ExecStep),
}

impl Step {
  pub fn short_name(&self) -> &'static str {
    match self {
      Step::Mkdir { .. } => "mkdir",
      Step::MakeCleanDir { .. } => "make_clean_dir",
      Step::Copy { .. } => "cp",
      Step::Exec(_) => "exec",
    }
  }

  /// Shell-like rendering used in logs and error messages.
  pub fn description(&self) -> String {
    match self {
      Step::Mkdir { path } => format!("mkdir -p {}", path.display()),
      Step::MakeCleanDir { path } => format!("rm -rf {0} && mkdir -p {0}", path.display()),
      Step::Copy { from, to } => format!("cp {} {}", from.display(), to.display()),
      Step::Exec(exec) => exec.argv.join(" "),
    }
  }
}

/// A step did not complete.
#[derive(Debug, Error)]
pub enum StepError {
  #[error("`{step}` exited with code {exit_code:?}")]
  Exited {
    step: String,
    exit_code: Option<i32>,
    stderr_tail: String,
  },

  #[error("`{step}` timed out after {timeout:?}")]
  TimedOut { step: String, timeout: Duration },

  #[error("`{step}` failed: {source}")]
  Io {
    step: String,
    #[source]
    source: io::Error,
  },
}

impl StepError {
  pub fn step(&self) -> &str {
    match self {
      StepError::Exited { step, .. } | StepError::TimedOut { step, .. } | StepError::Io { step, .. } => step,
    }
  }

  pub fn exit_code(&self) -> Option<i32> {
    match self {
      StepError::Exited { exit_code, .. } => *exit_code,
      _ => None,
    }
  }

  pub fn stderr_tail(&self) -> String {
    match self {
      StepError::Exited { stderr_tail, .. } => stderr_tail.clone(),
      StepError::TimedOut { .. } => String::new(),
      StepError::Io { source, .. } => source.to_string(),
    }
  }
}

/// Perform one step on behalf of `target`.
pub async fn execute_step(step: &Step, target: &BuildTarget, ctx: &ExecutionContext) -> Result<(), StepError> {
  let description = step.description();
  debug!(target = %target, step = %description, "running step");
  ctx.events().emit(BuildEvent::StepStarted {
    target: target.clone(),
    description: description.clone(),
  });

  let fs = ctx.filesystem();
  let io_err = |source| StepError::Io {
    step: description.clone(),
    source,
  };

  match step {
    Step::Mkdir { path } => fs.mkdirs(path).await.map_err(io_err),
    Step::MakeCleanDir { path } => fs.make_clean_dir(path).await.map_err(io_err),
    Step::Copy { from, to } => fs.copy(from, to).await.map_err(io_err),
    Step::Exec(exec) => execute_exec(exec, &description, ctx).await,
  }
}

async fn execute_exec(exec: &ExecStep, description: &str, ctx: &ExecutionContext) -> Result<(), StepError> {
  let Some((program, args)) = exec.argv.split_first() else {
    return Err(StepError::Io {
      step: description.to_string(),
      source: io::Error::new(io::ErrorKind::InvalidInput, "empty command line"),
    });
  };

  let fs = ctx.filesystem();
  let working_dir = exec.cwd.as_ref().map(|cwd| fs.resolve(cwd)).unwrap_or_else(|| fs.root().to_path_buf());

  let mut command = Command::new(program);
  command
    .args(args)
    .current_dir(&working_dir)
    .env_clear()
    .envs(ctx.env())
    .envs(&exec.env)
    .stdin(Stdio::null())
    .kill_on_drop(true);

  debug!(program = %program, working_dir = ?working_dir, "spawning process");

  let output = match exec.timeout {
    Some(timeout) => match tokio::time::timeout(timeout, command.output()).await {
      Ok(output) => output,
      Err(_) => {
        return Err(StepError::TimedOut {
          step: description.to_string(),
          timeout,
        });
      }
    },
    None => command.output().await,
  }
  .map_err(|source| StepError::Io {
    step: description.to_string(),
    source,
  })?;

  let stdout = String::from_utf8_lossy(&output.stdout);
  if !stdout.trim().is_empty() {
    debug!(stdout = %stdout.trim(), "command output");
  }

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    return Err(StepError::Exited {
      step: description.to_string(),
      exit_code: output.status.code(),
      stderr_tail: tail_lines(&stderr, STDERR_TAIL_LINES),
    });
  }

  Ok(())
}

fn tail_lines(text: &str, count: usize) -> String {
  let lines: Vec<&str> = text.lines().collect();
  let start = lines.len().saturating_sub(count);
  lines[start..].join("\n")
}
