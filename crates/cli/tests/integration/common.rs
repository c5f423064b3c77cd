//! Shared test helpers for CLI integration tests.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// A stand-in `javac`: creates one class file in the `-d` directory.
#[cfg(unix)]
const FAKE_JAVAC: &str = r#"#!/bin/sh
while [ $# -gt 0 ]; do
  if [ "$1" = "-d" ]; then out="$2"; shift; fi
  shift
done
touch "$out/Compiled.class"
"#;

/// A stand-in `jar`: `jar cf <jar> -C <dir> .`
#[cfg(unix)]
const FAKE_JAR: &str = r#"#!/bin/sh
echo "jar of $4" > "$2"
"#;

/// A stand-in `java` running the test runner: writes one passing case into
/// the output directory, or a failing one when `-Dfail=true` is passed.
#[cfg(unix)]
const FAKE_JAVA: &str = r#"#!/bin/sh
out=""
last=""
for arg in "$@"; do out="$last"; last="$arg"; done
case " $* " in
  *" -Dfail=true "*)
    printf '%s' '{"case_name":"com.example.FooTest","results":[{"case_name":"com.example.FooTest","test_name":"breaks","success":false,"time_ms":4,"message":"expected 1 but was 2"}]}' > "$out/com.example.FooTest.json"
    exit 1
    ;;
esac
printf '%s' '{"case_name":"com.example.FooTest","results":[{"case_name":"com.example.FooTest","test_name":"works","success":true,"time_ms":12}]}' > "$out/com.example.FooTest.json"
"#;

/// Isolated project directory.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  /// Write a file relative to the project root.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.root().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn read_file(&self, relative_path: &str) -> String {
    std::fs::read_to_string(self.root().join(relative_path))
      .unwrap_or_else(|e| panic!("Failed to read {}: {}", relative_path, e))
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.root().join(relative_path)
  }

  /// `brick --root <project>` with a clean environment.
  pub fn brick_cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("brick");
    cmd
      .arg("--root")
      .arg(self.root())
      .env_remove("BRICK_CACHE_DIR")
      .env_remove("BRICK_THREADS")
      .env_remove("RUST_LOG");
    cmd
  }

  /// Install stand-in JDK tools and point `.brickconfig` at them.
  /// `extra_config` is appended to the generated configuration.
  #[cfg(unix)]
  pub fn with_fake_java(&self, extra_config: &str) {
    use std::os::unix::fs::PermissionsExt;

    let tools = self.root().join("tools");
    std::fs::create_dir_all(&tools).unwrap();
    for (name, script) in [("javac", FAKE_JAVAC), ("jar", FAKE_JAR), ("java", FAKE_JAVA)] {
      let path = tools.join(name);
      std::fs::write(&path, script).unwrap();
      std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let config = format!(
      "[java]\njavac = \"{javac}\"\njar = \"{jar}\"\njava = \"{java}\"\n{extra}",
      javac = tools.join("javac").display(),
      jar = tools.join("jar").display(),
      java = tools.join("java").display(),
      extra = extra_config,
    );
    self.write_file(".brickconfig", &config);
  }
}
