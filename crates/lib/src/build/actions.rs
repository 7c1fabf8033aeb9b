//! Resolved build actions, ready to be written to the manifest.

use thiserror::Error;

use super::ninja_string::{BUILTINS, NinjaString, NinjaStringError, VarRef, parse_ninja_string};
use super::params::{BuildParams, DepsFormat, Pool, Rule, RuleParams};
use super::pctx::{PackageContext, rule_scope};

/// A rule with every string parsed in its scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedRule {
  pub(crate) command: NinjaString,
  pub(crate) description: NinjaString,
  pub(crate) depfile: NinjaString,
  pub(crate) deps: DepsFormat,
  pub(crate) restat: bool,
  pub(crate) generator: bool,
  pub(crate) pool: Option<Pool>,
  pub(crate) rspfile: NinjaString,
  pub(crate) rspfile_content: NinjaString,
}

impl ResolvedRule {
  /// Parse `params`; names that are neither arguments nor built-ins are
  /// resolved with `lookup`.
  pub(crate) fn resolve(
    params: &RuleParams,
    args: &[String],
    lookup: &dyn Fn(&str) -> Option<VarRef>,
  ) -> Result<Self, NinjaStringError> {
    let scope = |name: &str| rule_scope(name, args).or_else(|| lookup(name));
    let parse = |value: &str| parse_ninja_string(value, &scope);
    Ok(Self {
      command: parse(&params.command)?,
      description: parse(&params.description)?,
      depfile: parse(&params.depfile)?,
      deps: params.deps,
      restat: params.restat,
      generator: params.generator,
      pool: params.pool.clone(),
      rspfile: parse(&params.rspfile)?,
      rspfile_content: parse(&params.rspfile_content)?,
    })
  }

  /// Every variable the rule references.
  pub(crate) fn refs(&self) -> impl Iterator<Item = &VarRef> {
    [
      &self.command,
      &self.description,
      &self.depfile,
      &self.rspfile,
      &self.rspfile_content,
    ]
    .into_iter()
    .flat_map(NinjaString::refs)
  }
}

/// One build statement with its paths collected and its strings resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BuildDef {
  pub(crate) rule: Rule,
  pub(crate) outputs: Vec<String>,
  pub(crate) implicit_outputs: Vec<String>,
  pub(crate) inputs: Vec<String>,
  pub(crate) implicits: Vec<String>,
  pub(crate) order_only: Vec<String>,
  pub(crate) validations: Vec<String>,
  /// Per-statement overrides of rule variables such as `description`.
  pub(crate) vars: Vec<(String, NinjaString)>,
  pub(crate) args: Vec<(String, NinjaString)>,
  pub(crate) default: bool,
}

impl BuildDef {
  pub(crate) fn all_outputs(&self) -> impl Iterator<Item = &String> {
    self.outputs.iter().chain(&self.implicit_outputs)
  }

  pub(crate) fn refs(&self) -> impl Iterator<Item = &VarRef> {
    self.vars.iter().chain(&self.args).flat_map(|(_, v)| v.refs())
  }
}

/// Everything one module variant declared.
#[derive(Debug, Clone, Default)]
pub(crate) struct ModuleActions {
  pub(crate) variables: Vec<(String, NinjaString)>,
  pub(crate) rules: Vec<(String, ResolvedRule)>,
  pub(crate) builds: Vec<BuildDef>,
  pub(crate) phonies: Vec<(String, Vec<String>)>,
}

impl ModuleActions {
  pub(crate) fn is_empty(&self) -> bool {
    self.variables.is_empty() && self.rules.is_empty() && self.builds.is_empty() && self.phonies.is_empty()
  }

  pub(crate) fn rule(&self, name: &str) -> Option<&ResolvedRule> {
    self.rules.iter().find(|(n, _)| n == name).map(|(_, r)| r)
  }

  pub(crate) fn has_variable(&self, name: &str) -> bool {
    self.variables.iter().any(|(n, _)| n == name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum DeclareError {
  /// The statement is malformed independent of any scope.
  #[error("{0}")]
  Invalid(String),

  #[error("{0}")]
  Scope(String),

  /// A rule from another package was passed with the wrong package context.
  #[error("{0}")]
  Internal(String),
}

struct LocalRule {
  name: String,
  args: Vec<String>,
  command_deps: Vec<String>,
  command_order_only: Vec<String>,
}

/// Collects the variables, rules and build statements of one scope (a
/// module variant or a singleton), resolving every string as it is declared.
#[derive(Default)]
pub(crate) struct ActionBuilder {
  pub(crate) actions: ModuleActions,
  local_rules: Vec<LocalRule>,
  pub(crate) pctxs: Vec<&'static PackageContext>,
}

impl ActionBuilder {
  pub(crate) fn use_pctx(&mut self, pctx: &'static PackageContext) {
    if !self.pctxs.iter().any(|p| std::ptr::eq(*p, pctx)) {
      self.pctxs.push(pctx);
    }
  }

  /// This scope's variables, then the package's.
  fn lookup(&self, pctx: &PackageContext, name: &str) -> Option<VarRef> {
    if self.actions.has_variable(name) {
      return Some(VarRef::Local(name.to_string()));
    }
    pctx.lookup(name)
  }

  fn build_scope(&self, pctx: &PackageContext, name: &str) -> Option<VarRef> {
    if let Some(builtin) = BUILTINS.iter().copied().find(|b| *b == name) {
      return Some(VarRef::Builtin(builtin));
    }
    self.lookup(pctx, name)
  }

  pub(crate) fn variable(&mut self, pctx: &'static PackageContext, name: &str, value: &str) -> Result<(), DeclareError> {
    self.use_pctx(pctx);
    let value = parse_ninja_string(value, &|n| self.lookup(pctx, n))
      .map_err(|err| DeclareError::Scope(format!("variable {:?}: {}", name, err)))?;
    self.actions.variables.push((name.to_string(), value));
    Ok(())
  }

  pub(crate) fn rule(
    &mut self,
    pctx: &'static PackageContext,
    name: &str,
    params: RuleParams,
    args: &[&str],
  ) -> Result<Rule, DeclareError> {
    self.use_pctx(pctx);
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let rule = ResolvedRule::resolve(&params, &args, &|n| self.lookup(pctx, n))
      .map_err(|err| DeclareError::Scope(format!("rule {:?}: {}", name, err)))?;
    self.actions.rules.push((name.to_string(), rule));
    self.local_rules.push(LocalRule {
      name: name.to_string(),
      args,
      command_deps: params.command_deps,
      command_order_only: params.command_order_only,
    });
    Ok(Rule::Local(name.to_string()))
  }

  /// Resolve and record one build statement.
  pub(crate) fn build(&mut self, pctx: &'static PackageContext, params: &BuildParams) -> Result<(), DeclareError> {
    self.use_pctx(pctx);
    params.validate().map_err(DeclareError::Invalid)?;

    let (arg_names, command_deps, command_order_only) = match &params.rule {
      Rule::Phony => (Vec::new(), Vec::new(), Vec::new()),
      Rule::Global { pkg, name } => {
        let def = if *pkg == pctx.name() { pctx.rule(name) } else { None };
        let def = def.ok_or_else(|| {
          DeclareError::Internal(format!("rule {} is not declared in package {:?}", params.rule, pctx.name()))
        })?;
        (
          def.args.clone(),
          def.params.command_deps.clone(),
          def.params.command_order_only.clone(),
        )
      }
      Rule::Local(name) => {
        let rule = self
          .local_rules
          .iter()
          .find(|r| &r.name == name)
          .ok_or_else(|| DeclareError::Scope(format!("undefined rule {:?}", name)))?;
        (
          rule.args.clone(),
          rule.command_deps.clone(),
          rule.command_order_only.clone(),
        )
      }
    };

    let scope = |n: &str| self.build_scope(pctx, n);
    let mut args = Vec::with_capacity(params.args.len());
    for (key, value) in &params.args {
      if !arg_names.contains(key) {
        return Err(DeclareError::Scope(format!(
          "unknown argument {:?} for rule {}",
          key, params.rule
        )));
      }
      let value = parse_ninja_string(value, &scope)
        .map_err(|err| DeclareError::Scope(format!("argument {:?}: {}", key, err)))?;
      args.push((key.clone(), value));
    }

    let mut vars = Vec::new();
    for (name, value) in [("description", &params.description), ("depfile", &params.depfile)] {
      if value.is_empty() {
        continue;
      }
      let value =
        parse_ninja_string(value, &scope).map_err(|err| DeclareError::Scope(format!("{}: {}", name, err)))?;
      vars.push((name.to_string(), value));
    }
    if let Some(deps) = params.deps.as_str() {
      vars.push(("deps".to_string(), NinjaString::literal(deps)));
    }
    let symlinks = params.all_symlink_outputs();
    if !symlinks.is_empty() {
      vars.push(("symlink_outputs".to_string(), NinjaString::literal(&symlinks.join(" "))));
    }

    let mut implicits = params.all_implicits();
    implicits.extend(command_deps);
    let mut order_only = params.order_only.clone();
    order_only.extend(command_order_only);
    self.actions.builds.push(BuildDef {
      rule: params.rule.clone(),
      outputs: params.all_outputs(),
      implicit_outputs: params.all_implicit_outputs(),
      inputs: params.all_inputs(),
      implicits,
      order_only,
      validations: params.all_validations(),
      vars,
      args,
      default: params.default,
    });
    Ok(())
  }

  /// Add to a phony target; repeated calls accumulate.
  pub(crate) fn phony(&mut self, name: &str, deps: &[String]) {
    match self.actions.phonies.iter_mut().find(|(n, _)| n == name) {
      Some((_, existing)) => existing.extend(deps.iter().cloned()),
      None => self.actions.phonies.push((name.to_string(), deps.to_vec())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rule_strings_resolve_args_first() {
    let params = RuleParams {
      command: "$tool $flags $in > $out".to_string(),
      description: "run $tool".to_string(),
      ..Default::default()
    };
    let lookup = |name: &str| (name == "tool").then(|| VarRef::Local("tool".to_string()));
    let rule = ResolvedRule::resolve(&params, &["flags".to_string()], &lookup).unwrap();
    let refs: Vec<String> = rule.refs().map(|r| r.to_string()).collect();
    assert_eq!(refs, vec!["tool", "flags", "in", "out", "tool"]);
    assert!(rule.depfile.is_empty());

    let err = ResolvedRule::resolve(&params, &[], &lookup).unwrap_err();
    assert!(matches!(err, NinjaStringError::Undefined { ref name, .. } if name == "flags"));
  }

  use std::collections::BTreeMap;
  use std::sync::LazyLock;

  static PCTX: LazyLock<PackageContext> = LazyLock::new(|| {
    let mut pctx = PackageContext::new("test");
    pctx.static_variable("tool", "bin/tool");
    pctx
  });

  fn global_rule(name: &str) -> Rule {
    Rule::Global {
      pkg: "test",
      name: name.to_string(),
    }
  }

  #[test]
  fn local_rules_carry_command_deps() {
    let mut builder = ActionBuilder::default();
    builder.variable(&PCTX, "flags", "-O2").unwrap();
    let rule = builder
      .rule(
        &PCTX,
        "run",
        RuleParams {
          command: "${tool} $flags $extra $in > $out".to_string(),
          command_deps: vec!["bin/tool".to_string()],
          ..Default::default()
        },
        &["extra"],
      )
      .unwrap();
    builder
      .build(
        &PCTX,
        &BuildParams {
          rule,
          output: "out/a".to_string(),
          input: "a.in".to_string(),
          description: "run $out".to_string(),
          args: BTreeMap::from([("extra".to_string(), "-v".to_string())]),
          ..Default::default()
        },
      )
      .unwrap();

    let build = &builder.actions.builds[0];
    assert_eq!(build.implicits, vec!["bin/tool"]);
    assert_eq!(build.vars[0].0, "description");
    assert_eq!(build.args[0].0, "extra");
    assert_eq!(builder.pctxs.len(), 1);
  }

  #[test]
  fn undeclared_rules_and_arguments() {
    let mut builder = ActionBuilder::default();
    let params = BuildParams {
      rule: global_rule("missing"),
      output: "out/a".to_string(),
      ..Default::default()
    };
    assert!(matches!(builder.build(&PCTX, &params), Err(DeclareError::Internal(_))));

    let params = BuildParams {
      rule: Rule::Local("nope".to_string()),
      output: "out/a".to_string(),
      ..Default::default()
    };
    assert_eq!(
      builder.build(&PCTX, &params).unwrap_err().to_string(),
      "undefined rule \"nope\""
    );

    let params = BuildParams {
      output: "out/a".to_string(),
      args: BTreeMap::from([("x".to_string(), "1".to_string())]),
      ..Default::default()
    };
    assert_eq!(
      builder.build(&PCTX, &params).unwrap_err().to_string(),
      "unknown argument \"x\" for rule phony"
    );
    assert!(matches!(
      builder.build(&PCTX, &BuildParams::default()),
      Err(DeclareError::Invalid(_))
    ));
  }

  #[test]
  fn phonies_accumulate() {
    let mut builder = ActionBuilder::default();
    builder.phony("all", &["a".to_string()]);
    builder.phony("all", &["b".to_string()]);
    assert_eq!(builder.actions.phonies, vec![("all".to_string(), vec!["a".to_string(), "b".to_string()])]);
  }
}
