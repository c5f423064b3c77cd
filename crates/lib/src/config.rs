//! Project configuration.
//!
//! Read from `.brickconfig` (TOML) at the project root. Every key is
//! optional:
//!
//! ```toml
//! [build]
//! threads = 8
//! keep_going = true
//!
//! [cache]
//! mode = "dir"            # or "none"
//! dir = "buck-out/cache"
//!
//! [test]
//! excluded_labels = "slow, e2e"
//!
//! [java]
//! src_roots = "/java/, src, src-gen"
//! javac = "javac"
//! ```
//!
//! `BRICK_CACHE_DIR` and `BRICK_THREADS` override the file.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::{CONFIG_FILE_NAME, DEFAULT_CACHE_DIR};
use crate::engine::{EngineConfig, num_cpus};
use crate::rules::JavaOptions;
use crate::testing::PackageFinder;

pub const CACHE_DIR_ENV: &str = "BRICK_CACHE_DIR";
pub const THREADS_ENV: &str = "BRICK_THREADS";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: io::Error,
  },

  #[error("invalid configuration in {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: toml::de::Error,
  },

  #[error("invalid value for {key}: {message}")]
  Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
  pub build: BuildSection,
  pub cache: CacheSection,
  pub test: TestSection,
  pub java: JavaSection,
}

/// `[build]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSection {
  pub threads: Option<usize>,
  pub keep_going: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
  #[default]
  Dir,
  None,
}

/// `[cache]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
  pub mode: CacheMode,
  pub dir: Option<PathBuf>,
}

/// `[test]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestSection {
  /// Comma-separated labels whose tests are skipped unless asked for.
  pub excluded_labels: Option<String>,
}

/// `[java]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JavaSection {
  pub src_roots: Option<String>,
  pub javac: Option<String>,
  pub jar: Option<String>,
  pub java: Option<String>,
  pub test_runner: Option<String>,
}

impl ProjectConfig {
  /// Load `<project_root>/.brickconfig` and apply environment overrides.
  /// A missing file yields the defaults.
  pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
    let path = project_root.join(CONFIG_FILE_NAME);
    let mut config = match std::fs::read_to_string(&path) {
      Ok(text) => Self::parse(&text, &path)?,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = ?path, "no project config, using defaults");
        Self::default()
      }
      Err(source) => {
        return Err(ConfigError::Read {
          path: path.display().to_string(),
          source,
        });
      }
    };
    config.apply_env_overrides()?;
    Ok(config)
  }

  pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
    let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
      path: path.display().to_string(),
      source,
    })?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.build.threads == Some(0) {
      return Err(ConfigError::Invalid {
        key: "build.threads",
        message: "must be at least 1".to_string(),
      });
    }
    Ok(())
  }

  fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
      self.cache.mode = CacheMode::Dir;
      self.cache.dir = Some(PathBuf::from(dir));
    }
    if let Ok(threads) = std::env::var(THREADS_ENV) {
      let threads = threads.trim().parse::<usize>().map_err(|e| ConfigError::Invalid {
        key: THREADS_ENV,
        message: e.to_string(),
      })?;
      self.build.threads = Some(threads);
    }
    self.validate()
  }

  /// Labels from `test.excluded_labels`.
  pub fn default_excluded_labels(&self) -> Vec<String> {
    split_list(self.test.excluded_labels.as_deref())
  }

  pub fn package_finder(&self) -> PackageFinder {
    let roots = split_list(self.java.src_roots.as_deref());
    PackageFinder::from_src_roots(roots.iter().map(String::as_str))
  }

  pub fn java_options(&self) -> JavaOptions {
    let defaults = JavaOptions::default();
    let java = &self.java;
    JavaOptions {
      javac: java.javac.clone().unwrap_or(defaults.javac),
      jar: java.jar.clone().unwrap_or(defaults.jar),
      java: java.java.clone().unwrap_or(defaults.java),
      test_runner: java.test_runner.clone().unwrap_or(defaults.test_runner),
      ..defaults
    }
  }

  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      parallelism: self.build.threads.unwrap_or_else(num_cpus),
      keep_going: self.build.keep_going.unwrap_or(true),
    }
  }

  /// The artifact cache directory, or `None` when caching is off.
  pub fn cache_dir(&self, project_root: &Path) -> Option<PathBuf> {
    match self.cache.mode {
      CacheMode::None => None,
      CacheMode::Dir => {
        let dir = self.cache.dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
        Some(project_root.join(dir))
      }
    }
  }
}

fn split_list(value: Option<&str>) -> Vec<String> {
  value
    .unwrap_or_default()
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect()
}
