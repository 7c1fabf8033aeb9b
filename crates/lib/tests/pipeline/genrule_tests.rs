use pretty_assertions::assert_eq;

use super::common::{Tree, lines_starting};

const GEN: &str = "out/soong/.intermediates/a";

#[test]
fn tool_files_and_sources() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"
genrule {
    name: "gen",
    tool_files: ["gen.sh"],
    srcs: ["in.txt"],
    out: ["out.h"],
    cmd: "$(location) $(in) > $(out)",
}
"#,
    )
    .files(&["a/gen.sh", "a/in.txt"])
    .run()
    .unwrap();

  assert_eq!(
    lines_starting(&out.manifest, &format!("build {}", GEN)),
    vec![format!(
      "build {gen}/gen/android_arm64/gen/out.h: g.genrule.generate a/in.txt | a/gen.sh",
      gen = GEN
    )]
  );
  assert_eq!(
    lines_starting(&out.manifest, "  cmd = "),
    vec![format!("  cmd = a/gen.sh a/in.txt > {}/gen/android_arm64/gen/out.h", GEN)]
  );
  assert!(out.manifest.contains("rule g.genrule.generate\n  command = ${cmd}\n  description = generate ${out}\n"));
}

#[test]
fn defaults_supply_the_command() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"
genrule_defaults {
    name: "gen_defaults",
    cmd: "echo $$HOME > $(out)",
    srcs: ["common.txt"],
}

genrule {
    name: "g",
    defaults: ["gen_defaults"],
    srcs: ["g.txt"],
    out: ["o.txt"],
}
"#,
    )
    .files(&["a/common.txt", "a/g.txt"])
    .run()
    .unwrap();

  assert_eq!(
    lines_starting(&out.manifest, &format!("build {}", GEN)),
    vec![format!(
      "build {}/g/android_arm64/gen/o.txt: g.genrule.generate a/common.txt a/g.txt",
      GEN
    )]
  );
  assert_eq!(
    lines_starting(&out.manifest, "  cmd = "),
    vec![format!("  cmd = echo $$HOME > {}/g/android_arm64/gen/o.txt", GEN)]
  );
}

#[test]
fn host_tools() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"
genrule {
    name: "tool",
    host_supported: true,
    device_supported: false,
    tool_files: ["t.py"],
    out: ["t"],
    cmd: "cp $(location) $(out)",
}

genrule {
    name: "use",
    tools: ["tool"],
    out: ["u"],
    cmd: "$(location tool) > $(out)",
}
"#,
    )
    .files(&["a/t.py"])
    .run()
    .unwrap();

  assert_eq!(
    lines_starting(&out.manifest, "  cmd = "),
    vec![
      format!("  cmd = cp a/t.py {}/tool/linux_glibc_x86_64/gen/t", GEN),
      format!("  cmd = {gen}/tool/linux_glibc_x86_64/gen/t > {gen}/use/android_arm64/gen/u", gen = GEN),
    ]
  );
}

#[test]
fn generated_files_feed_other_modules() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"
genrule {
    name: "conf_gen",
    out: ["generated.conf"],
    cmd: "echo x > $(out)",
}

prebuilt_etc {
    name: "generated.conf",
    src: ":conf_gen",
}
"#,
    )
    .run()
    .unwrap();

  assert_eq!(
    lines_starting(&out.manifest, "build out/target/"),
    vec![format!(
      "build out/target/product/generic/system/etc/generated.conf: g.blueprint.cp {}/conf_gen/android_arm64/gen/generated.conf",
      GEN
    )]
  );
}

#[test]
fn command_errors() {
  let err = Tree::new()
    .bp(
      "a/Android.bp",
      r#"genrule { name: "g", out: ["o"], cmd: "$(location nope) > $(out)" }"#,
    )
    .run()
    .unwrap_err();
  assert!(err.to_string().contains("cmd: unknown location label \"nope\""), "{}", err);

  let err = Tree::new()
    .bp("a/Android.bp", r#"genrule { name: "g", cmd: "true" }"#)
    .run()
    .unwrap_err();
  assert!(err.to_string().contains("out: must have at least one output file"), "{}", err);
}
