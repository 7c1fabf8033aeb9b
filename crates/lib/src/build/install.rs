//! Install paths and the rules that copy files into the install tree.

use std::sync::LazyLock;

use crate::config::Config;
use crate::graph::ProviderKey;
use crate::module::Partition;
use crate::platform::{OsClass, Target};

use super::depset::DepSet;
use super::pctx::PackageContext;
use super::params::{Rule, RuleParams};

/// One file placed in an install tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackagingSpec {
  /// Path inside the partition or host tree, e.g. `etc/init/foo.rc`.
  pub relative_path: String,
  /// Where the file is installed, relative to the source root.
  pub install_path: String,
  /// The file copied into place; empty for symlinks.
  pub src: String,
  pub executable: bool,
  pub symlink_target: Option<String>,
}

/// What a module variant installs, including everything installed by
/// dependencies reached through install edges.
#[derive(Debug, Clone, Default)]
pub struct InstallInfo {
  pub install_paths: DepSet<String>,
  pub packaging_specs: DepSet<PackagingSpec>,
}

pub static INSTALL_INFO: ProviderKey<InstallInfo> = ProviderKey::new("install_info");

/// Files a module variant produced, for `:module` references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputFiles {
  pub default: Vec<String>,
  /// Outputs selected by `:module{.tag}`.
  pub tagged: Vec<(String, Vec<String>)>,
}

impl OutputFiles {
  pub fn new(default: Vec<String>) -> Self {
    Self {
      default,
      tagged: Vec::new(),
    }
  }

  pub fn get(&self, tag: &str) -> Option<&[String]> {
    if tag.is_empty() {
      return Some(&self.default);
    }
    self.tagged.iter().find(|(t, _)| t == tag).map(|(_, files)| files.as_slice())
  }
}

pub static OUTPUT_FILES: ProviderKey<OutputFiles> = ProviderKey::new("output_files");

pub(crate) struct BuiltinRules {
  pub(crate) pctx: PackageContext,
  pub(crate) cp: Rule,
  pub(crate) cp_executable: Rule,
  pub(crate) symlink: Rule,
  pub(crate) error: Rule,
}

pub(crate) static BUILTIN: LazyLock<BuiltinRules> = LazyLock::new(|| {
  let mut pctx = PackageContext::new("blueprint");
  let cp = pctx.static_rule(
    "cp",
    RuleParams {
      command: "rm -f $out && cp -f $in $out".to_string(),
      description: "install $out".to_string(),
      ..Default::default()
    },
    &[],
  );
  let cp_executable = pctx.static_rule(
    "cp_executable",
    RuleParams {
      command: "rm -f $out && cp -f $in $out && chmod +x $out".to_string(),
      description: "install $out".to_string(),
      ..Default::default()
    },
    &[],
  );
  let symlink = pctx.static_rule(
    "symlink",
    RuleParams {
      command: "rm -f $out && ln -sfn $fromPath $out".to_string(),
      description: "symlink $out".to_string(),
      ..Default::default()
    },
    &["fromPath"],
  );
  let error = pctx.static_rule(
    "error",
    RuleParams {
      command: "echo $error && false".to_string(),
      description: "error building $out".to_string(),
      ..Default::default()
    },
    &["error"],
  );
  BuiltinRules {
    pctx,
    cp,
    cp_executable,
    symlink,
    error,
  }
});

/// Root of the install tree a variant installs into.
pub(crate) fn install_root(config: &Config, target: Option<Target>, partition: Partition) -> String {
  match target {
    Some(t) if t.class() == OsClass::Host => config.host_out(t.os),
    _ => format!("{}/{}", config.product_out(), partition.dir()),
  }
}

pub(crate) fn join_path(parts: &[&str]) -> String {
  parts
    .iter()
    .flat_map(|p| p.split('/'))
    .filter(|p| !p.is_empty() && *p != ".")
    .collect::<Vec<_>>()
    .join("/")
}

/// `target` relative to the directory holding `link`.
pub(crate) fn relative_to(link: &str, target: &str) -> String {
  let link_dir: Vec<&str> = link.split('/').collect::<Vec<_>>();
  let link_dir = &link_dir[..link_dir.len().saturating_sub(1)];
  let target_parts: Vec<&str> = target.split('/').collect();
  let common = link_dir.iter().zip(target_parts.iter()).take_while(|(a, b)| a == b).count();
  let mut parts: Vec<&str> = vec![".."; link_dir.len() - common];
  parts.extend(&target_parts[common..]);
  parts.join("/")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::platform::{ArchType, Os};
  use crate::testutil::test_config;

  #[test]
  fn install_roots() {
    let config = test_config();
    assert_eq!(
      install_root(&config, Some(Target::new(Os::Android, ArchType::Arm64)), Partition::Vendor),
      "out/target/product/generic/vendor"
    );
    assert_eq!(
      install_root(&config, Some(Target::new(Os::LinuxGlibc, ArchType::X86_64)), Partition::Vendor),
      "out/host/linux-x86"
    );
    assert_eq!(install_root(&config, None, Partition::System), "out/target/product/generic/system");
  }

  #[test]
  fn paths() {
    assert_eq!(join_path(&["out/x", "", "etc/", "a.conf"]), "out/x/etc/a.conf");
    assert_eq!(relative_to("out/system/bin/sh", "out/system/bin/mksh"), "mksh");
    assert_eq!(relative_to("out/system/etc/a", "out/system/bin/b"), "../bin/b");
  }

  #[test]
  fn output_files_by_tag() {
    let mut files = OutputFiles::new(vec!["a.h".to_string()]);
    files.tagged.push(("cpp".to_string(), vec!["a.cpp".to_string()]));
    assert_eq!(files.get(""), Some(&["a.h".to_string()][..]));
    assert_eq!(files.get(".cpp"), None);
    assert_eq!(files.get("cpp"), Some(&["a.cpp".to_string()][..]));
  }
}
