use super::common::Tree;

#[test]
fn duplicate_outputs_cite_both_modules() {
  let err = Tree::new()
    .bp("a/Android.bp", r#"prebuilt_etc { name: "a", src: "x.conf", filename: "x.conf" }"#)
    .bp("b/Android.bp", r#"prebuilt_etc { name: "b", src: "x.conf", filename: "x.conf" }"#)
    .files(&["a/x.conf", "b/x.conf"])
    .run()
    .unwrap_err();

  let diags = err.diagnostics();
  assert_eq!(diags.len(), 1);
  let msg = diags[0].to_string();
  assert!(msg.starts_with("b/Android.bp:1:1: module \"b\""), "{}", msg);
  assert!(msg.contains("is already produced by module \"a\" at a/Android.bp:1:1"), "{}", msg);
}

#[test]
fn newlines_cannot_reach_the_manifest() {
  let err = Tree::new()
    .bp(
      "a/Android.bp",
      r#"
genrule {
    name: "g",
    out: ["o.txt"],
    cmd: "touch $(out)\nrm -rf /tmp/x",
}
"#,
    )
    .run()
    .unwrap_err();

  let diags = err.diagnostics();
  assert_eq!(diags.len(), 1);
  let msg = diags[0].to_string();
  assert!(msg.starts_with("a/Android.bp:2:1: module \"g\""), "{}", msg);
  assert!(msg.contains("argument \"cmd\""), "{}", msg);
  assert!(msg.contains("contains a newline"), "{}", msg);
}

#[test]
fn unrecognized_property() {
  let err = Tree::new()
    .bp("a/Android.bp", "filegroup {\n    name: \"fg\",\n    bogus: 1,\n}\n")
    .run()
    .unwrap_err();

  assert_eq!(
    err.to_string(),
    "a/Android.bp:3:10: module \"fg\": unrecognized property \"bogus\""
  );
}

#[test]
fn dependency_cycles() {
  let err = Tree::new()
    .bp(
      "a/Android.bp",
      r#"
prebuilt_etc { name: "x", src: "x.conf", required: ["y"] }
prebuilt_etc { name: "y", src: "y.conf", required: ["x"] }
"#,
    )
    .files(&["a/x.conf", "a/y.conf"])
    .run()
    .unwrap_err();

  let msg = err.to_string();
  assert!(msg.contains("encountered dependency cycle"), "{}", msg);
}

#[test]
fn invisible_dependencies() {
  let err = Tree::new()
    .bp(
      "a/Android.bp",
      r#"filegroup { name: "fg", srcs: ["f.txt"], visibility: ["//visibility:private"] }"#,
    )
    .bp(
      "b/Android.bp",
      r#"filegroup { name: "user", srcs: [":fg"] }"#,
    )
    .files(&["a/f.txt"])
    .run()
    .unwrap_err();

  let msg = err.to_string();
  assert!(msg.contains("module \"user\""), "{}", msg);
  assert!(msg.contains("depends on //a:fg which is not visible to this module"), "{}", msg);
}

#[test]
fn visible_to_listed_packages() {
  Tree::new()
    .bp(
      "a/Android.bp",
      r#"filegroup { name: "fg", srcs: ["f.txt"], visibility: ["//b:__pkg__"] }"#,
    )
    .bp("b/Android.bp", r#"filegroup { name: "user", srcs: [":fg"] }"#)
    .files(&["a/f.txt"])
    .run()
    .unwrap();
}

#[test]
fn missing_sources() {
  let err = Tree::new()
    .bp("a/Android.bp", r#"filegroup { name: "fg", srcs: ["nope.txt"] }"#)
    .run()
    .unwrap_err();

  assert!(
    err.to_string().contains("srcs: module source path \"a/nope.txt\" does not exist"),
    "{}",
    err
  );
}

#[test]
fn errors_are_capped() {
  let mut bp = String::new();
  for i in 0..15 {
    bp.push_str(&format!("cc_binary {{ name: \"m{}\" }}\n", i));
  }
  let err = Tree::new().bp("a/Android.bp", &bp).run().unwrap_err();
  assert_eq!(err.diagnostics().len(), 10);
}
