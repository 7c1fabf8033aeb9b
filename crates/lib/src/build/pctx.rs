//! Package contexts: namespaces for global variables, rules and pools.
//!
//! A module type declares its package context once, in a `LazyLock`, and
//! passes it to every [`ModuleContext::build`](super::ModuleContext::build)
//! call. Names are emitted prefixed with `g.<package>.` so two packages can
//! reuse a variable or rule name.
//!
//! ```
//! use std::sync::LazyLock;
//! use blueprint_lib::build::{PackageContext, Rule, RuleParams};
//!
//! struct Rules {
//!   pctx: PackageContext,
//!   touch: Rule,
//! }
//!
//! static RULES: LazyLock<Rules> = LazyLock::new(|| {
//!   let mut pctx = PackageContext::new("example");
//!   pctx.static_variable("touch", "/usr/bin/touch");
//!   let touch = pctx.static_rule(
//!     "touch",
//!     RuleParams {
//!       command: "${touch} $out".to_string(),
//!       ..Default::default()
//!     },
//!     &[],
//!   );
//!   Rules { pctx, touch }
//! });
//! assert_eq!(RULES.pctx.name(), "example");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::config::Config;

use super::ninja_string::{BUILTINS, NinjaString, NinjaStringError, VarRef, parse_ninja_string};
use super::params::{Pool, Rule, RuleParams};

pub type VariableFunc = Arc<dyn Fn(&Config) -> String + Send + Sync>;

#[derive(Clone)]
pub(crate) enum VariableDef {
  Static(String),
  Func(VariableFunc),
}

impl VariableDef {
  pub(crate) fn value(&self, config: &Config) -> String {
    match self {
      VariableDef::Static(value) => value.clone(),
      VariableDef::Func(f) => f(config),
    }
  }
}

#[derive(Debug, Clone)]
pub(crate) struct RuleDef {
  pub(crate) params: RuleParams,
  pub(crate) args: Vec<String>,
}

pub struct PackageContext {
  name: &'static str,
  variables: Vec<(String, VariableDef)>,
  rules: Vec<(String, RuleDef)>,
  pools: Vec<(String, usize)>,
}

impl fmt::Debug for PackageContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PackageContext")
      .field("name", &self.name)
      .field("variables", &self.variables.iter().map(|(n, _)| n).collect::<Vec<_>>())
      .field("rules", &self.rules.iter().map(|(n, _)| n).collect::<Vec<_>>())
      .field("pools", &self.pools)
      .finish()
  }
}

impl PackageContext {
  pub fn new(name: &'static str) -> Self {
    Self {
      name,
      variables: Vec::new(),
      rules: Vec::new(),
      pools: Vec::new(),
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  /// A variable with a fixed value, which may reference earlier variables of
  /// this package.
  pub fn static_variable(&mut self, name: &str, value: &str) {
    self.set_variable(name, VariableDef::Static(value.to_string()));
  }

  /// A variable computed from the configuration when the manifest is written.
  pub fn variable_func(&mut self, name: &str, f: impl Fn(&Config) -> String + Send + Sync + 'static) {
    self.set_variable(name, VariableDef::Func(Arc::new(f)));
  }

  fn set_variable(&mut self, name: &str, def: VariableDef) {
    match self.variables.iter_mut().find(|(n, _)| n == name) {
      Some(slot) => slot.1 = def,
      None => self.variables.push((name.to_string(), def)),
    }
  }

  /// Declare a rule. `args` are the variables each build statement may set.
  pub fn static_rule(&mut self, name: &str, params: RuleParams, args: &[&str]) -> Rule {
    let def = RuleDef {
      params,
      args: args.iter().map(|a| a.to_string()).collect(),
    };
    match self.rules.iter_mut().find(|(n, _)| n == name) {
      Some(slot) => slot.1 = def,
      None => self.rules.push((name.to_string(), def)),
    }
    Rule::Global {
      pkg: self.name,
      name: name.to_string(),
    }
  }

  pub fn static_pool(&mut self, name: &str, depth: usize) -> Pool {
    match self.pools.iter_mut().find(|(n, _)| n == name) {
      Some(slot) => slot.1 = depth,
      None => self.pools.push((name.to_string(), depth)),
    }
    Pool::Global {
      pkg: self.name,
      name: name.to_string(),
    }
  }

  pub(crate) fn variable(&self, name: &str) -> Option<&VariableDef> {
    self.variables.iter().find(|(n, _)| n == name).map(|(_, d)| d)
  }

  pub(crate) fn rule(&self, name: &str) -> Option<&RuleDef> {
    self.rules.iter().find(|(n, _)| n == name).map(|(_, d)| d)
  }

  pub(crate) fn pool(&self, name: &str) -> Option<usize> {
    self.pools.iter().find(|(n, _)| n == name).map(|(_, d)| *d)
  }

  /// Resolve a reference to one of this package's variables.
  pub(crate) fn lookup(&self, name: &str) -> Option<VarRef> {
    self.variable(name).map(|_| VarRef::Global {
      pkg: self.name,
      name: name.to_string(),
    })
  }

  /// Parse the value of one of this package's variables, which may reference
  /// the package's other variables.
  pub(crate) fn parse_variable_value(&self, value: &str) -> Result<NinjaString, NinjaStringError> {
    parse_ninja_string(value, &|name| self.lookup(name))
  }

  /// Parse a rule's command-side strings in the rule's scope: its arguments,
  /// the runner's built-ins and this package's variables.
  pub(crate) fn parse_rule_string(&self, value: &str, args: &[String]) -> Result<NinjaString, NinjaStringError> {
    parse_ninja_string(value, &|name| rule_scope(name, args).or_else(|| self.lookup(name)))
  }
}

pub(crate) fn rule_scope(name: &str, args: &[String]) -> Option<VarRef> {
  if let Some(builtin) = BUILTINS.iter().copied().find(|b| *b == name) {
    return Some(VarRef::Builtin(builtin));
  }
  args.iter().any(|a| a == name).then(|| VarRef::Arg(name.to_string()))
}

/// Identifier for a global name in the manifest.
pub(crate) fn global_name(pkg: &str, name: &str) -> String {
  format!("g.{}.{}", sanitize(pkg), name)
}

/// Replace characters the manifest does not accept in identifiers.
pub(crate) fn sanitize(name: &str) -> String {
  name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') { c } else { '_' })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn declarations_are_scoped_by_package() {
    let mut pctx = PackageContext::new("cc");
    pctx.static_variable("clang", "prebuilts/clang/bin/clang");
    pctx.variable_func("out", |config| config.out_dir.clone());
    let rule = pctx.static_rule(
      "compile",
      RuleParams {
        command: "${clang} $cflags -c $in -o $out".to_string(),
        ..Default::default()
      },
      &["cflags"],
    );
    assert_eq!(
      rule,
      Rule::Global {
        pkg: "cc",
        name: "compile".to_string()
      }
    );

    let def = pctx.rule("compile").unwrap();
    let command = pctx.parse_rule_string(&def.params.command, &def.args).unwrap();
    assert_eq!(
      command.render(&|v| match v {
        VarRef::Global { pkg, name } => global_name(pkg, name),
        other => other.to_string(),
      }),
      "${g.cc.clang} ${cflags} -c ${in} -o ${out}"
    );

    let config = crate::testutil::test_config();
    assert_eq!(pctx.variable("out").unwrap().value(&config), "out");
  }

  #[test]
  fn undeclared_arguments_are_rejected() {
    let pctx = PackageContext::new("cc");
    let err = pctx.parse_rule_string("cc $cflags", &[]).unwrap_err();
    assert!(matches!(err, NinjaStringError::Undefined { ref name, .. } if name == "cflags"));
  }

  #[test]
  fn names_are_sanitized() {
    assert_eq!(global_name("android/soong", "cp"), "g.android_soong.cp");
    assert_eq!(sanitize("lib+foo@1"), "lib_foo_1");
  }
}
