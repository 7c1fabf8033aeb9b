//! `visibility` enforcement.
//!
//! A module's `visibility` lists the packages (source directories) allowed to
//! depend on it. An empty list is public. Modules in the same package can
//! always see each other.

use std::fmt;

use crate::graph::MutatorContext;
use crate::module::Module;

const PUBLIC: &str = "//visibility:public";
const PRIVATE: &str = "//visibility:private";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilityRule {
  Public,
  Private,
  /// `//dir:__pkg__`
  Package(String),
  /// `//dir:__subpackages__`
  Subpackages(String),
}

impl VisibilityRule {
  pub fn parse(rule: &str) -> Result<Self, String> {
    match rule {
      PUBLIC => return Ok(Self::Public),
      PRIVATE => return Ok(Self::Private),
      _ => {}
    }
    let invalid = || format!("invalid visibility pattern {:?}", rule);
    let path = rule.strip_prefix("//").ok_or_else(invalid)?;
    let (dir, target) = path.split_once(':').ok_or_else(invalid)?;
    if dir.starts_with('/') || dir.ends_with('/') || dir == "visibility" {
      return Err(invalid());
    }
    match target {
      "__pkg__" => Ok(Self::Package(dir.to_string())),
      "__subpackages__" => Ok(Self::Subpackages(dir.to_string())),
      _ => Err(invalid()),
    }
  }

  /// Whether a module in `dir` may depend on a module in `owner` with this rule.
  pub fn allows(&self, owner: &str, dir: &str) -> bool {
    match self {
      Self::Public => true,
      Self::Private => owner == dir,
      Self::Package(pkg) => pkg == dir,
      Self::Subpackages(pkg) => {
        pkg.is_empty() || dir == pkg || dir.strip_prefix(pkg.as_str()).is_some_and(|rest| rest.starts_with('/'))
      }
    }
  }
}

impl fmt::Display for VisibilityRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Public => f.write_str(PUBLIC),
      Self::Private => f.write_str(PRIVATE),
      Self::Package(dir) => write!(f, "//{}:__pkg__", dir),
      Self::Subpackages(dir) => write!(f, "//{}:__subpackages__", dir),
    }
  }
}

/// Parse a `visibility` list, reporting every bad entry.
pub(crate) fn parse_rules(rules: &[String]) -> (Vec<VisibilityRule>, Vec<String>) {
  let mut parsed = Vec::new();
  let mut errors = Vec::new();
  for rule in rules {
    match VisibilityRule::parse(rule) {
      Ok(rule) => parsed.push(rule),
      Err(err) => errors.push(err),
    }
  }
  for special in [VisibilityRule::Public, VisibilityRule::Private] {
    if rules.len() > 1 && parsed.contains(&special) {
      errors.push(format!("cannot mix {:?} with any other visibility rules", special.to_string()));
    }
  }
  (parsed, errors)
}

fn visible(rules: &[VisibilityRule], owner: &str, dir: &str) -> bool {
  owner == dir || rules.is_empty() || rules.iter().any(|r| r.allows(owner, dir))
}

pub(super) fn check_visibility(ctx: &mut MutatorContext<'_>, module: &mut dyn Module) {
  let (_, errors) = parse_rules(&module.base().common.visibility);
  for err in errors {
    ctx.property_errorf("visibility", err);
  }

  let dir = ctx.module_dir();
  let mut hidden = Vec::new();
  ctx.visit_direct_deps(|dep| {
    let Some(target) = dep.module() else {
      return;
    };
    let (rules, _) = parse_rules(&target.base().common.visibility);
    if !visible(&rules, dep.dir(), dir) {
      let label = format!("//{}:{}", dep.dir(), dep.name());
      if !hidden.contains(&label) {
        hidden.push(label);
      }
    }
  });
  for label in hidden {
    ctx.module_errorf(format!("depends on {} which is not visible to this module", label));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rules(items: &[&str]) -> Vec<VisibilityRule> {
    let items: Vec<String> = items.iter().map(|s| s.to_string()).collect();
    let (parsed, errors) = parse_rules(&items);
    assert!(errors.is_empty(), "{:?}", errors);
    parsed
  }

  #[test]
  fn parses_patterns() {
    assert_eq!(VisibilityRule::parse("//visibility:public"), Ok(VisibilityRule::Public));
    assert_eq!(
      VisibilityRule::parse("//vendor/x:__subpackages__"),
      Ok(VisibilityRule::Subpackages("vendor/x".to_string()))
    );
    assert_eq!(VisibilityRule::parse("//a:__pkg__").unwrap().to_string(), "//a:__pkg__");
    assert_eq!(
      VisibilityRule::parse("//a:b"),
      Err("invalid visibility pattern \"//a:b\"".to_string())
    );
    assert!(VisibilityRule::parse("a:__pkg__").is_err());
  }

  #[test]
  fn public_and_private_stand_alone() {
    let items = vec!["//visibility:public".to_string(), "//a:__pkg__".to_string()];
    let (_, errors) = parse_rules(&items);
    assert_eq!(
      errors,
      vec!["cannot mix \"//visibility:public\" with any other visibility rules".to_string()]
    );
  }

  #[test]
  fn package_matching() {
    let owner = "lib";
    assert!(visible(&rules(&[]), owner, "app"));
    assert!(!visible(&rules(&["//visibility:private"]), owner, "app"));
    assert!(visible(&rules(&["//visibility:private"]), owner, "lib"));
    assert!(visible(&rules(&["//app:__pkg__"]), owner, "app"));
    assert!(!visible(&rules(&["//app:__pkg__"]), owner, "app/sub"));
    assert!(visible(&rules(&["//app:__subpackages__"]), owner, "app/sub"));
    assert!(!visible(&rules(&["//app:__subpackages__"]), owner, "application"));
    assert!(visible(&rules(&["//:__subpackages__"]), owner, "anything/at/all"));
  }
}
