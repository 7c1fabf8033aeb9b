use blueprint_lib::build::INSTALL_INFO;
use pretty_assertions::assert_eq;

use super::common::{ETC, Tree, lines_starting};

#[test]
fn required_modules_install_first() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"
prebuilt_etc {
    name: "q",
    src: "q.conf",
}

prebuilt_etc {
    name: "p",
    src: "p.conf",
    required: ["q"],
}
"#,
    )
    .files(&["a/q.conf", "a/p.conf"])
    .run()
    .unwrap();

  let p = out.graph.variants_of("p")[0];
  let info = out.graph.info(p).providers().get(&INSTALL_INFO).unwrap();
  assert_eq!(
    info.install_paths.to_list(),
    vec![format!("{}/q", ETC), format!("{}/p", ETC)]
  );
  assert_eq!(
    lines_starting(&out.manifest, "build p-install:"),
    vec![format!("build p-install: phony {}/q {}/p", ETC, ETC)]
  );
}

#[test]
fn install_rules_copy_sources() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"prebuilt_etc { name: "p", src: "p.conf", sub_dir: "init" }"#,
    )
    .files(&["a/p.conf"])
    .run()
    .unwrap();

  assert_eq!(
    lines_starting(&out.manifest, &format!("build {}", ETC)),
    vec![format!("build {}/init/p: g.blueprint.cp a/p.conf", ETC)]
  );
  assert!(out.manifest.contains("rule g.blueprint.cp\n  command = rm -f ${out} && cp -f ${in} ${out}\n"));
}

#[test]
fn phony_names_the_closure_of_required() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"
prebuilt_etc { name: "x", src: "x.conf" }
prebuilt_etc { name: "y", src: "y.conf" }
phony { name: "configs", required: ["x", "y"] }
"#,
    )
    .files(&["a/x.conf", "a/y.conf"])
    .run()
    .unwrap();

  assert_eq!(
    lines_starting(&out.manifest, "build configs-install:"),
    vec![format!("build configs-install: phony {}/x {}/y", ETC, ETC)]
  );
}

#[test]
fn skipped_installs_build_nothing() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"prebuilt_etc { name: "p", src: "p.conf", installable: false }"#,
    )
    .files(&["a/p.conf"])
    .run()
    .unwrap();

  assert!(lines_starting(&out.manifest, &format!("build {}", ETC)).is_empty());
}

#[test]
fn symlinks_point_at_the_installed_file() {
  let out = Tree::new()
    .bp(
      "a/Android.bp",
      r#"prebuilt_etc { name: "p", src: "p.conf", symlinks: ["p.link"] }"#,
    )
    .files(&["a/p.conf"])
    .run()
    .unwrap();

  let manifest = super::common::unwrapped(&out.manifest);
  assert!(manifest.contains(&format!(
    "build {etc}/p.link: g.blueprint.symlink || {etc}/p\n  symlink_outputs = {etc}/p.link\n  fromPath = p\n",
    etc = ETC
  )));
}
