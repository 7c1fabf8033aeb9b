use pretty_assertions::assert_eq;

use super::common::{ETC, Tree, lines_starting};

#[test]
fn host_supported_adds_a_host_variant() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"prebuilt_etc { name: "p", src: "p.conf", host_supported: true }"#,
    )
    .files(&["a/p.conf"])
    .run()
    .unwrap();

  let variants: Vec<String> = out
    .graph
    .variants_of("p")
    .iter()
    .map(|id| out.graph.info(*id).variant_name())
    .collect();
  assert_eq!(variants, vec!["android_arm64", "linux_glibc_x86_64"]);
  assert!(out.manifest.contains("build out/host/linux-x86/etc/p: g.blueprint.cp a/p.conf"));
  assert!(out.manifest.contains(&format!("build {}/p: g.blueprint.cp a/p.conf", ETC)));
}

#[test]
fn multilib_both_splits_every_device_arch() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"genrule { name: "g", compile_multilib: "both", out: ["o"], cmd: "touch $(out)" }"#,
    )
    .run()
    .unwrap();

  let variants: Vec<String> = out
    .graph
    .variants_of("g")
    .iter()
    .map(|id| out.graph.info(*id).variant_name())
    .collect();
  assert_eq!(variants, vec!["android_arm64", "android_arm"]);
}

#[test]
fn arch_overlays_extend_lists() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"
genrule {
    name: "g",
    compile_multilib: "both",
    srcs: ["common.in"],
    arch: {
        arm64: { srcs: ["arm64.in"] },
    },
    target: {
        android: { srcs: ["android.in"] },
    },
    out: ["o"],
    cmd: "cat $(in) > $(out)",
}
"#,
    )
    .files(&["a/common.in", "a/arm64.in", "a/android.in"])
    .run()
    .unwrap();

  assert_eq!(
    lines_starting(&out.manifest, "build out/soong/"),
    vec![
      "build out/soong/.intermediates/a/g/android_arm64/gen/o: g.genrule.generate a/common.in a/arm64.in a/android.in"
        .to_string(),
      "build out/soong/.intermediates/a/g/android_arm/gen/o: g.genrule.generate a/common.in a/android.in".to_string(),
    ]
  );
}

#[test]
fn product_variables_substitute_values() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"
genrule {
    name: "g",
    out: ["o"],
    cmd: "touch $(out)",
    product_variables: {
        build_id: { cmd: "echo %s > $(out)" },
        debuggable: { srcs: ["debug.in"] },
        unset_flag: { srcs: ["never.in"] },
    },
}
"#,
    )
    .files(&["a/debug.in"])
    .run_with(|config| {
      let vars = blueprint_lib::config::ProductVariables::from_json(r#"{"Build_id": "ABC", "Debuggable": true}"#).unwrap();
      config.apply_product_variables(vars).unwrap();
    })
    .unwrap();

  assert_eq!(
    lines_starting(&out.manifest, "  cmd = "),
    vec!["  cmd = echo ABC > out/soong/.intermediates/a/g/android_arm64/gen/o".to_string()]
  );
  assert!(super::common::unwrapped(&out.manifest).contains("g.genrule.generate a/debug.in"));
}

#[test]
fn disabled_modules_build_nothing() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"prebuilt_etc { name: "p", src: "p.conf", enabled: false }"#,
    )
    .files(&["a/p.conf"])
    .run()
    .unwrap();

  assert!(lines_starting(&out.manifest, "build out/target/").is_empty());
}
