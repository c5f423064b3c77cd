//! Test command integration tests, run against stand-in JDK tools.

use predicates::prelude::*;

use super::common::TestEnv;

fn java_project(extra_config: &str) -> TestEnv {
  let env = TestEnv::new();
  env.with_fake_java(extra_config);
  env.write_file(
    "java/BUCK",
    r#"
      java_library {
        name = "lib",
        srcs = { "src/Lib.java" },
        visibility = { "PUBLIC" },
      }

      java_test {
        name = "fast_test",
        srcs = { "FooTest.java" },
        deps = { ":lib" },
        source_under_test = { ":lib" },
        labels = { "fast" },
      }

      java_test {
        name = "slow_test",
        srcs = { "FooTest.java" },
        labels = { "slow" },
        vm_args = { "-Dfail=true" },
      }
    "#,
  );
  env.write_file("java/src/Lib.java", "class Lib {}");
  env.write_file("java/FooTest.java", "class FooTest {}");
  env
}

#[test]
fn passing_test_succeeds() {
  let env = java_project("");

  env
    .brick_cmd()
    .args(["test", "//java:fast_test"])
    .assert()
    .success()
    .stdout(predicate::str::contains("com.example.FooTest (1 passed, 0 failed"))
    .stdout(predicate::str::contains("TESTS PASSED"));

  assert!(env.path("buck-out/gen/java/lib__fast_test__output/fast_test.jar").exists());
}

#[test]
fn failing_test_fails_the_command() {
  let env = java_project("");

  env
    .brick_cmd()
    .args(["test", "//java:slow_test"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("breaks"))
    .stderr(predicate::str::contains("expected 1 but was 2"))
    .stderr(predicate::str::contains("TESTS FAILED"));
}

#[test]
fn include_selects_by_label() {
  let env = java_project("");

  env
    .brick_cmd()
    .args(["test", "--include", "fast"])
    .assert()
    .success()
    .stdout(predicate::str::contains("//java:fast_test"))
    .stdout(predicate::str::contains("//java:slow_test").not());
}

#[test]
fn configured_exclude_skips_tests() {
  let env = java_project("[test]\nexcluded_labels = \"slow\"\n");

  env
    .brick_cmd()
    .arg("test")
    .assert()
    .success()
    .stdout(predicate::str::contains("Passed: 1"));
}

#[test]
fn include_overrides_configured_exclude() {
  let env = java_project("[test]\nexcluded_labels = \"slow\"\n");

  env
    .brick_cmd()
    .args(["test", "--include", "slow"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("TESTS FAILED"));
}

#[test]
fn explicit_target_overrides_configured_exclude() {
  let env = java_project("[test]\nexcluded_labels = \"slow\"\n");

  env
    .brick_cmd()
    .args(["test", "//java:slow_test"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("expected 1 but was 2"));
}

#[test]
fn command_line_exclude_skips_tests() {
  let env = java_project("");

  env
    .brick_cmd()
    .args(["test", "-e", "slow,other"])
    .assert()
    .success()
    .stdout(predicate::str::contains("TESTS PASSED"));
}

#[test]
fn xml_report_is_written() {
  let env = java_project("");

  env
    .brick_cmd()
    .current_dir(env.root())
    .args(["test", "//java:fast_test", "--xml", "reports/tests.xml"])
    .assert()
    .success();

  let xml = env.read_file("reports/tests.xml");
  assert!(xml.contains(r#"<test name="com.example.FooTest">"#), "{xml}");
  assert!(xml.contains(r#"<testresult name="works" time="12">"#), "{xml}");
}

#[test]
fn xml_report_path_is_relative_to_working_directory() {
  let env = java_project("");
  let elsewhere = tempfile::TempDir::new().unwrap();

  env
    .brick_cmd()
    .current_dir(elsewhere.path())
    .args(["test", "//java:fast_test", "--xml", "out.xml"])
    .assert()
    .success();

  assert!(elsewhere.path().join("out.xml").exists());
  assert!(!env.path("out.xml").exists());
}

#[test]
fn cached_build_reuses_test_results() {
  let env = java_project("");
  env.brick_cmd().args(["test", "//java:fast_test"]).assert().success();
  let results = env.path("buck-out/gen/java/__java_test_fast_test_output__/com.example.FooTest.json");
  assert!(results.exists());

  // Remove the stand-in java; a rerun would now fail.
  std::fs::remove_file(env.path("tools/java")).unwrap();

  env
    .brick_cmd()
    .args(["test", "//java:fast_test"])
    .assert()
    .success()
    .stdout(predicate::str::contains("TESTS PASSED"));
}

#[test]
fn debug_forces_a_rerun() {
  let env = java_project("");
  env.brick_cmd().args(["test", "//java:fast_test"]).assert().success();
  std::fs::remove_file(env.path("tools/java")).unwrap();

  env
    .brick_cmd()
    .args(["test", "//java:fast_test", "--debug"])
    .assert()
    .failure();
}

#[test]
fn code_coverage_lists_source_folders() {
  let env = java_project("src_roots = \"src\"\n");

  env
    .brick_cmd()
    .args(["test", "//java:fast_test", "--code-coverage"])
    .assert()
    .success()
    .stdout(predicate::str::contains("java/src/"));
}
