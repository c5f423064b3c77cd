//! Targets command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

fn project() -> TestEnv {
  let env = TestEnv::new();
  env.write_file(
    "java/BUCK",
    r#"
      java_library { name = "lib", srcs = { "Lib.java" }, visibility = { "PUBLIC" } }
      java_test { name = "lib_test", srcs = { "LibTest.java" }, deps = { ":lib" } }
    "#,
  );
  env.write_file("docs/BUCK", r#"export_file { name = "guide.md" }"#);
  env
}

#[test]
fn lists_every_target_sorted() {
  let env = project();

  env
    .brick_cmd()
    .arg("targets")
    .assert()
    .success()
    .stdout("//docs:guide.md\n//java:lib\n//java:lib_test\n");
}

#[test]
fn filters_by_rule_type() {
  let env = project();

  env
    .brick_cmd()
    .args(["targets", "--type", "java_test"])
    .assert()
    .success()
    .stdout("//java:lib_test\n");
}

#[test]
fn limits_to_patterns() {
  let env = project();

  env
    .brick_cmd()
    .args(["targets", "//docs:"])
    .assert()
    .success()
    .stdout(predicate::str::contains("//java").not());
}
