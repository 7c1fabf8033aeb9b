//! CLI smoke tests for blueprint.
//!
//! These tests run the binary against small build trees on disk and check
//! exit codes, the written files and stderr.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

/// Get a Command for the blueprint binary.
fn blueprint_cmd() -> Command {
  let mut cmd = cargo_bin_cmd!("blueprint");
  cmd.env_remove("RUST_LOG").env_remove("SYSROOT");
  cmd
}

/// A tree with the given files and a `files.list` naming every `Android.bp`.
fn temp_tree(files: &[(&str, &str)]) -> TempDir {
  let temp = TempDir::new().unwrap();
  let mut list = String::new();
  for (path, contents) in files {
    let full = temp.path().join(path);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(&full, contents).unwrap();
    if path.ends_with("Android.bp") {
      list.push_str(path);
      list.push('\n');
    }
  }
  fs::write(temp.path().join("files.list"), list).unwrap();
  temp
}

const ETC_CONFIG: &str = r#"
prebuilt_etc {
    name: "p",
    src: "p.conf",
}
"#;

fn etc_tree() -> TempDir {
  temp_tree(&[("a/Android.bp", ETC_CONFIG), ("a/p.conf", "key=value\n")])
}

fn read(dir: &Path, path: &str) -> String {
  fs::read_to_string(dir.join(path)).unwrap()
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  blueprint_cmd()
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"))
    .stdout(predicate::str::contains("--empty-ninja-file"));
}

#[test]
fn version_flag_works() {
  blueprint_cmd()
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("blueprint"));
}

#[test]
fn missing_list_flag_fails() {
  blueprint_cmd()
    .assert()
    .code(1)
    .stderr(predicate::str::contains("-l"));
}

// =============================================================================
// Runs
// =============================================================================

#[test]
fn writes_manifest_and_dep_file() {
  let temp = etc_tree();
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list"])
    .assert()
    .success()
    .stderr(predicate::str::contains("Wrote out/soong/build.ninja"));

  let manifest = read(temp.path(), "out/soong/build.ninja");
  assert!(manifest.contains("rule g.blueprint.cp"));
  assert!(manifest.contains("g.blueprint.cp a/p.conf"));
  assert!(manifest.contains("build p: phony"));

  let depfile = read(temp.path(), "out/soong/build.ninja.d");
  assert!(depfile.starts_with("out/soong/build.ninja: \\\n"));
  assert!(depfile.contains(" files.list \\\n"));
  assert!(depfile.contains(" a/Android.bp"));
}

#[test]
fn output_flag_moves_the_manifest() {
  let temp = etc_tree();
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list", "-o", "gen/custom.ninja"])
    .assert()
    .success();

  assert!(temp.path().join("gen/custom.ninja").is_file());
  assert!(read(temp.path(), "gen/custom.ninja.d").starts_with("gen/custom.ninja: \\\n"));
  assert!(!temp.path().join("out/soong/build.ninja").exists());
}

#[test]
fn empty_ninja_file_still_runs_everything() {
  let temp = etc_tree();
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list", "--empty-ninja-file"])
    .assert()
    .success();

  assert_eq!(read(temp.path(), "out/soong/build.ninja"), "");
  assert!(read(temp.path(), "out/soong/build.ninja.d").contains("a/Android.bp"));
}

#[test]
fn empty_ninja_file_still_reports_errors() {
  let temp = temp_tree(&[("a/Android.bp", "cc_library { name: \"x\" }\n")]);
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list", "--empty-ninja-file"])
    .assert()
    .code(1);
  assert!(!temp.path().join("out/soong/build.ninja").exists());
}

#[test]
fn top_flag_sets_the_source_root() {
  let temp = etc_tree();
  let list = temp.path().join("files.list");
  let manifest = temp.path().join("build.ninja");
  blueprint_cmd()
    .arg("-l")
    .arg(&list)
    .arg("-o")
    .arg(&manifest)
    .arg("--top")
    .arg(temp.path())
    .assert()
    .success();

  assert!(fs::read_to_string(&manifest).unwrap().contains("a/p.conf"));
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn diagnostics_exit_one() {
  let temp = temp_tree(&[("a/Android.bp", "cc_library { name: \"x\" }\n")]);
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains(
      "a/Android.bp:1:1: unrecognized module type \"cc_library\"",
    ));
}

#[test]
fn every_diagnostic_is_printed() {
  let temp = temp_tree(&[
    ("a/Android.bp", "cc_library { name: \"x\" }\n"),
    ("b/Android.bp", "java_library { name: \"y\" }\n"),
  ]);
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("\"cc_library\""))
    .stderr(predicate::str::contains("\"java_library\""));
}

#[test]
fn unreadable_list_fails() {
  let temp = TempDir::new().unwrap();
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "nope.list"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("Failed to read build file list nope.list"));
}

#[test]
fn empty_list_fails() {
  let temp = temp_tree(&[]);
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("no build files listed"));
}

#[test]
fn missing_dependencies_need_the_flag() {
  let bp = r#"
phony {
    name: "p",
    required: ["absent"],
}
"#;
  let temp = temp_tree(&[("a/Android.bp", bp)]);
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("absent"));

  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list", "--allow-missing-dependencies"])
    .assert()
    .success();
  assert!(read(temp.path(), "out/soong/build.ninja").contains("missing dependencies: absent"));
}

// =============================================================================
// JSON dumps
// =============================================================================

#[test]
fn trace_lists_stages() {
  let temp = etc_tree();
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list", "--trace", "trace.json"])
    .assert()
    .success();

  let trace: serde_json::Value = serde_json::from_str(&read(temp.path(), "trace.json")).unwrap();
  let stages = trace.as_array().unwrap();
  assert_eq!(stages[0]["stage"], "parse");
  assert_eq!(stages.last().unwrap()["stage"], "manifest");
  assert!(stages.iter().all(|s| s["micros"].is_u64()));
}

#[test]
fn module_graph_lists_variants() {
  let temp = etc_tree();
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list", "--module-graph", "graph.json"])
    .assert()
    .success();

  let graph: serde_json::Value = serde_json::from_str(&read(temp.path(), "graph.json")).unwrap();
  let p = graph
    .as_array()
    .unwrap()
    .iter()
    .find(|m| m["name"] == "p")
    .unwrap();
  assert_eq!(p["type"], "prebuilt_etc");
  assert_eq!(p["pos"], "a/Android.bp:2:1");
}

#[test]
fn soong_variables_are_loaded() {
  let bp = r#"
prebuilt_etc {
    name: "p",
    src: "p.conf",
    product_variables: {
        debuggable: {
            src: "debug.conf",
        },
    },
}
"#;
  let temp = temp_tree(&[
    ("a/Android.bp", bp),
    ("a/p.conf", ""),
    ("a/debug.conf", ""),
    ("vars.json", r#"{"Debuggable": true}"#),
  ]);
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list", "--soong-variables", "vars.json"])
    .assert()
    .success();
  assert!(read(temp.path(), "out/soong/build.ninja").contains("a/debug.conf"));
}

#[test]
fn bad_soong_variables_fail() {
  let temp = temp_tree(&[("a/Android.bp", ETC_CONFIG), ("vars.json", "{not json")]);
  blueprint_cmd()
    .current_dir(temp.path())
    .args(["-l", "files.list", "--soong-variables", "vars.json"])
    .assert()
    .code(1)
    .stderr(predicate::str::contains("invalid product variables"));
}

// =============================================================================
// Environment and compatibility flags
// =============================================================================

#[test]
#[serial]
fn sysroot_is_consumed() {
  let temp = etc_tree();
  blueprint_cmd()
    .current_dir(temp.path())
    .env("SYSROOT", "/opt/sysroot")
    .args(["-l", "files.list", "-v"])
    .assert()
    .success()
    .stderr(predicate::str::contains("consumed SYSROOT"))
    .stderr(predicate::str::contains("/opt/sysroot"));
}

#[test]
#[serial]
fn inherited_environment_is_honored() {
  let temp = etc_tree();
  temp_env::with_vars(
    [("SYSROOT", Some("/opt/inherited")), ("RUST_LOG", Some("debug"))],
    || {
      cargo_bin_cmd!("blueprint")
        .current_dir(temp.path())
        .args(["-l", "files.list"])
        .assert()
        .success()
        .stderr(predicate::str::contains("consumed SYSROOT"))
        .stderr(predicate::str::contains("/opt/inherited"));
    },
  );
}

#[test]
#[serial]
fn rust_log_overrides_the_default_level() {
  let temp = etc_tree();
  temp_env::with_vars([("SYSROOT", None::<&str>), ("RUST_LOG", Some("error"))], || {
    cargo_bin_cmd!("blueprint")
      .current_dir(temp.path())
      .args(["-l", "files.list", "--no-gc"])
      .assert()
      .success()
      .stderr(predicate::str::contains("--no-gc has no effect").not());
  });
}

#[test]
#[serial]
fn compatibility_flags_are_accepted() {
  let temp = etc_tree();
  blueprint_cmd()
    .current_dir(temp.path())
    .args([
      "-l",
      "files.list",
      "--no-gc",
      "--cpuprofile",
      "cpu.prof",
      "--memprofile",
      "mem.prof",
    ])
    .assert()
    .success()
    .stderr(predicate::str::contains("--no-gc has no effect"));
  assert!(!temp.path().join("cpu.prof").exists());
}
