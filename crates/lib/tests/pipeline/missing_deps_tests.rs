use super::common::{Tree, lines_starting};

const BP: &str = r#"
prebuilt_etc {
    name: "p",
    src: "p.conf",
    required: ["absent"],
}
"#;

#[test]
fn strict_mode_fails() {
  let err = Tree::new().bp("a/Android.bp", BP).files(&["a/p.conf"]).run().unwrap_err();

  let msg = err.to_string();
  assert!(msg.contains("module \"p\""), "{}", msg);
  assert!(msg.contains("depends on undefined module \"absent\""), "{}", msg);
}

#[test]
fn allowed_missing_deps_become_error_actions() {
  let out = Tree::new()
    .bp("a/Android.bp", BP)
    .files(&["a/p.conf"])
    .run_with(|config| config.allow_missing_dependencies = true)
    .unwrap();

  assert_eq!(
    lines_starting(&out.manifest, "build out/soong/.missing_deps/"),
    vec!["build out/soong/.missing_deps/p_android_arm64: g.blueprint.error".to_string()]
  );
  assert!(
    out
      .manifest
      .contains("missing dependencies: absent"),
    "{}",
    out.manifest
  );
  // nothing is installed in place of the real actions
  assert!(lines_starting(&out.manifest, "build out/target/").is_empty());
}

#[test]
fn missing_sources_are_deferred_too() {
  let out = Tree::new()
    .bp("a/Android.bp", r#"filegroup { name: "fg", srcs: ["gone.txt"] }"#)
    .run_with(|config| config.allow_missing_dependencies = true)
    .unwrap();

  assert!(out.manifest.contains("out/soong/.missing_deps/fg"), "{}", out.manifest);
  assert!(out.manifest.contains("missing dependencies: a/gone.txt"));
}
