//! brick: build and test targets declared in `BUCK` files.

mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{BuildOptions, Project, TestArgs, cmd_build, cmd_targets, cmd_test};
use output::print_error;

#[derive(Parser)]
#[command(name = "brick")]
#[command(author, version, about = "Build and test targets declared in BUCK files", long_about = None)]
struct Cli {
  /// Project root (default: current directory)
  #[arg(long, global = true)]
  root: Option<PathBuf>,

  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build targets and their dependencies
  Build {
    /// Targets or patterns such as //app:main, //lib: or //lib/...
    #[arg(required = true)]
    targets: Vec<String>,

    /// Number of rules to build at once
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Start no new rules after the first failure
    #[arg(long)]
    fail_fast: bool,
  },

  /// Build and run tests
  Test {
    /// Tests to run; named targets run even if their labels are excluded
    targets: Vec<String>,

    /// Only run tests with one of these labels
    #[arg(long, value_delimiter = ',')]
    include: Vec<String>,

    /// Skip tests whose labels are all in this list
    #[arg(short = 'e', long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Write an XML report to this path (relative to the working directory)
    #[arg(long)]
    xml: Option<PathBuf>,

    /// Always rerun tests, even when cached results exist
    #[arg(long)]
    debug: bool,

    /// Print the source folders covered by the selected tests
    #[arg(long)]
    code_coverage: bool,

    /// Run every test, ignoring label filters
    #[arg(long)]
    all: bool,

    /// Number of rules to build at once
    #[arg(short = 'j', long)]
    threads: Option<usize>,
  },

  /// List targets
  Targets {
    /// Patterns to list (default: //...)
    patterns: Vec<String>,

    /// Only list rules of this type
    #[arg(long = "type")]
    rule_types: Vec<String>,
  },
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
  let project = Project::open(cli.root.as_deref())?;

  match cli.command {
    Commands::Build {
      targets,
      threads,
      fail_fast,
    } => cmd_build(
      &project,
      &targets,
      &BuildOptions {
        threads,
        fail_fast,
        debug: false,
      },
    ),
    Commands::Test {
      targets,
      include,
      exclude,
      xml,
      debug,
      code_coverage,
      all,
      threads,
    } => cmd_test(
      &project,
      &TestArgs {
        targets,
        include,
        exclude,
        xml,
        code_coverage,
        all,
        build: BuildOptions {
          threads,
          fail_fast: false,
          debug,
        },
      },
    ),
    Commands::Targets { patterns, rule_types } => cmd_targets(&project, &patterns, &rule_types).map(|()| true),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("brick").chain(args.iter().copied())).unwrap()
  }

  #[test]
  fn exclude_alias_and_repeats_accumulate() {
    let cli = parse(&["test", "-e", "e2e", "--exclude", "other", "--include", "e2e"]);
    let Commands::Test { include, exclude, .. } = cli.command else {
      panic!("expected test command");
    };
    assert_eq!(exclude, vec!["e2e", "other"]);
    assert_eq!(include, vec!["e2e"]);
  }

  #[test]
  fn comma_separated_labels() {
    let cli = parse(&["test", "--include", "linux,windows", "//a:t"]);
    let Commands::Test { include, targets, .. } = cli.command else {
      panic!("expected test command");
    };
    assert_eq!(include, vec!["linux", "windows"]);
    assert_eq!(targets, vec!["//a:t"]);
  }

  #[test]
  fn build_requires_targets() {
    assert!(Cli::try_parse_from(["brick", "build"]).is_err());
  }
}
