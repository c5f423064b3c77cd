//! Build command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

fn web_project() -> TestEnv {
  let env = TestEnv::new();
  env.write_file(
    "web/BUCK",
    r#"
      export_file { name = "index.html" }
      export_file { name = "style.css", src = "css/main.css", deps = { ":index.html" } }
    "#,
  );
  env.write_file("web/index.html", "<h1>hi</h1>");
  env.write_file("web/css/main.css", "h1 {}");
  env
}

#[test]
fn build_exports_file_into_gen_dir() {
  let env = web_project();

  env
    .brick_cmd()
    .args(["build", "//web:index.html"])
    .assert()
    .success()
    .stdout(predicate::str::contains("BUILT"))
    .stdout(predicate::str::contains("buck-out/gen/web/index.html"));

  assert_eq!(env.read_file("buck-out/gen/web/index.html"), "<h1>hi</h1>");
}

#[test]
fn build_follows_dependencies() {
  let env = web_project();

  env.brick_cmd().args(["build", "//web:style.css"]).assert().success();

  assert_eq!(env.read_file("buck-out/gen/web/style.css"), "h1 {}");
  assert!(env.path("buck-out/gen/web/index.html").exists());
}

#[test]
fn rebuild_restores_outputs_from_cache() {
  let env = web_project();
  env.brick_cmd().args(["build", "//web/..."]).assert().success();
  std::fs::remove_dir_all(env.path("buck-out/gen")).unwrap();

  env
    .brick_cmd()
    .args(["build", "//web/..."])
    .assert()
    .success()
    .stdout(predicate::str::contains("CACHED"))
    .stdout(predicate::str::contains("BUILT").not());

  assert_eq!(env.read_file("buck-out/gen/web/index.html"), "<h1>hi</h1>");
}

#[test]
fn disabled_cache_always_builds() {
  let env = web_project();
  env.write_file(".brickconfig", "[cache]\nmode = \"none\"\n");
  env.brick_cmd().args(["build", "//web:index.html"]).assert().success();

  env
    .brick_cmd()
    .args(["build", "//web:index.html"])
    .assert()
    .success()
    .stdout(predicate::str::contains("CACHED").not());
  assert!(!env.path("buck-out/cache").exists());
}

#[test]
fn failed_rule_fails_the_build() {
  let env = TestEnv::new();
  env.write_file(
    "BUCK",
    r#"
      export_file { name = "missing.txt" }
      export_file { name = "ok.txt" }
    "#,
  );
  env.write_file("ok.txt", "ok");

  env
    .brick_cmd()
    .args(["build", "//..."])
    .assert()
    .failure()
    .stdout(predicate::str::contains("FAILED"))
    .stderr(predicate::str::contains("//:missing.txt"));

  assert!(env.path("buck-out/gen/ok.txt").exists());
}

#[test]
fn unknown_target_is_reported() {
  let env = web_project();

  env
    .brick_cmd()
    .args(["build", "//web:nope"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("no such build target: //web:nope"));
}

#[test]
fn parse_errors_name_the_build_file() {
  let env = TestEnv::new();
  env.write_file("broken/BUCK", "export_file { name = ");

  env
    .brick_cmd()
    .args(["build", "//broken:x"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Parse error for BUCK file"));
}

#[test]
fn dependency_cycles_are_reported() {
  let env = TestEnv::new();
  env.write_file(
    "BUCK",
    r#"
      export_file { name = "a", deps = { ":b" } }
      export_file { name = "b", deps = { ":a" } }
    "#,
  );

  env
    .brick_cmd()
    .args(["build", "//:a"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("dependency cycle detected"));
}

#[test]
fn visibility_is_enforced() {
  let env = TestEnv::new();
  env.write_file("lib/BUCK", r#"export_file { name = "private.txt" }"#);
  env.write_file("lib/private.txt", "secret");
  env.write_file(
    "app/BUCK",
    r#"export_file { name = "app.txt", deps = { "//lib:private.txt" } }"#,
  );
  env.write_file("app/app.txt", "app");

  env
    .brick_cmd()
    .args(["build", "//app:app.txt"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("not visible"));
}
