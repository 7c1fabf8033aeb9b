//! Assemble the manifest from everything the generate stage and the
//! singletons declared.
//!
//! Only globals reachable from an emitted build statement are written: the
//! rules builds use, the variables those rules, builds and other live
//! variables reference, and the pools of live rules. Every section is written
//! in a fixed order so the same input always yields the same bytes.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use crate::build::{
  BuildDef, GeneratedActions, ModuleActions, NinjaString, PackageContext, Pool, ResolvedRule, Rule, SingletonOutput,
  VarRef, global_name, sanitize,
};
use crate::config::Config;
use crate::consts::NINJA_REQUIRED_VERSION;
use crate::error::Diagnostic;
use crate::graph::{Graph, ModuleId};
use crate::proptools::ninja_escape;

use super::writer::NinjaWriter;

const LOCAL_POOL: &str = "local";

/// Everything the manifest is built from.
pub(crate) struct ManifestInput<'a> {
  pub(crate) config: &'a Config,
  pub(crate) graph: &'a Graph,
  pub(crate) modules: &'a BTreeMap<ModuleId, GeneratedActions>,
  pub(crate) singletons: &'a [SingletonOutput],
  pub(crate) subninjas: &'a [String],
}

enum Header {
  Module {
    name: String,
    variant: String,
    type_name: String,
    pos: String,
  },
  Singleton(String),
}

/// One namespace of local names: a module variant or a singleton.
struct Scope<'a> {
  prefix: String,
  header: Header,
  actions: &'a ModuleActions,
}

fn module_prefix(name: &str, variant: &str) -> String {
  if variant.is_empty() {
    format!("m.{}.", sanitize(name))
  } else {
    format!("m.{}_{}.", sanitize(name), sanitize(variant))
  }
}

fn var_name(prefix: &str, var: &VarRef) -> String {
  match var {
    VarRef::Global { pkg, name } => global_name(pkg, name),
    VarRef::Local(name) => format!("{}{}", prefix, name),
    VarRef::Arg(name) => name.clone(),
    VarRef::Builtin(name) => name.to_string(),
  }
}

fn rule_name(prefix: &str, rule: &Rule) -> String {
  match rule {
    Rule::Phony => "phony".to_string(),
    Rule::Global { pkg, name } => global_name(pkg, name),
    Rule::Local(name) => format!("{}{}", prefix, name),
  }
}

fn pool_name(pool: &Pool) -> String {
  match pool {
    Pool::Console => "console".to_string(),
    Pool::Local => LOCAL_POOL.to_string(),
    Pool::Global { pkg, name } => global_name(pkg, name),
  }
}

fn escape_all(paths: &[String]) -> Vec<String> {
  paths.iter().map(|p| ninja_escape(p)).collect()
}

/// Globals reachable from the emitted builds.
#[derive(Default)]
struct LiveGlobals {
  variables: BTreeMap<(&'static str, String), NinjaString>,
  rules: BTreeMap<(&'static str, String), ResolvedRule>,
  pools: BTreeMap<String, usize>,
}

struct Assembler<'a> {
  config: &'a Config,
  pctxs: BTreeMap<&'static str, &'static PackageContext>,
  live: LiveGlobals,
  diags: Vec<Diagnostic>,
}

impl<'a> Assembler<'a> {
  fn pctx(&mut self, pkg: &str) -> Option<&'static PackageContext> {
    let found = self.pctxs.get(pkg).copied();
    if found.is_none() {
      self.diags.push(Diagnostic::internal(format!("package context {:?} is not registered", pkg)));
    }
    found
  }

  fn mark_variable(&mut self, pkg: &'static str, name: &str) {
    let key = (pkg, name.to_string());
    if self.live.variables.contains_key(&key) {
      return;
    }
    let Some(pctx) = self.pctx(pkg) else {
      return;
    };
    let Some(def) = pctx.variable(name) else {
      self.diags.push(Diagnostic::internal(format!("undefined variable {}", global_name(pkg, name))));
      return;
    };
    let value = def.value(self.config);
    match pctx.parse_variable_value(&value) {
      Ok(parsed) => {
        let refs: Vec<VarRef> = parsed.refs().cloned().collect();
        self.live.variables.insert(key, parsed);
        self.mark_refs(refs.iter());
      }
      Err(err) => {
        self.diags.push(Diagnostic::user(format!("variable {}: {}", global_name(pkg, name), err)));
        self.live.variables.insert(key, NinjaString::default());
      }
    }
  }

  fn mark_refs<'r>(&mut self, refs: impl Iterator<Item = &'r VarRef>) {
    for var in refs {
      if let VarRef::Global { pkg, name } = var {
        self.mark_variable(pkg, name);
      }
    }
  }

  fn mark_pool(&mut self, pool: &Option<Pool>) {
    match pool {
      Some(Pool::Local) => {
        let depth = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        self.live.pools.insert(LOCAL_POOL.to_string(), depth);
      }
      Some(Pool::Global { pkg, name }) => {
        let Some(pctx) = self.pctx(pkg) else {
          return;
        };
        match pctx.pool(name) {
          Some(depth) => {
            self.live.pools.insert(global_name(pkg, name), depth);
          }
          None => self.diags.push(Diagnostic::internal(format!("undefined pool {}", global_name(pkg, name)))),
        }
      }
      Some(Pool::Console) | None => {}
    }
  }

  fn mark_rule(&mut self, pkg: &'static str, name: &str) {
    let key = (pkg, name.to_string());
    if self.live.rules.contains_key(&key) {
      return;
    }
    let Some(pctx) = self.pctx(pkg) else {
      return;
    };
    let Some(def) = pctx.rule(name) else {
      self.diags.push(Diagnostic::internal(format!("undefined rule {}", global_name(pkg, name))));
      return;
    };
    match ResolvedRule::resolve(&def.params, &def.args, &|n| pctx.lookup(n)) {
      Ok(rule) => {
        let refs: Vec<VarRef> = rule.refs().cloned().collect();
        let pool = rule.pool.clone();
        self.live.rules.insert(key, rule);
        self.mark_refs(refs.iter());
        self.mark_pool(&pool);
      }
      Err(err) => self.diags.push(Diagnostic::user(format!("rule {}: {}", global_name(pkg, name), err))),
    }
  }

  fn mark_scope(&mut self, actions: &ModuleActions) {
    for (_, value) in &actions.variables {
      self.mark_refs(value.refs());
    }
    for (_, rule) in &actions.rules {
      self.mark_refs(rule.refs());
      self.mark_pool(&rule.pool);
    }
    for build in &actions.builds {
      if let Rule::Global { pkg, name } = &build.rule {
        self.mark_rule(pkg, name);
      }
      self.mark_refs(build.refs());
    }
  }
}

/// Render the manifest text.
pub(crate) fn write_manifest(input: &ManifestInput<'_>) -> Result<String, Vec<Diagnostic>> {
  let mut scopes = Vec::new();
  let mut phony_sources = Vec::new();
  for id in input.graph.live_modules() {
    let Some(generated) = input.modules.get(&id) else {
      continue;
    };
    phony_sources.push(&generated.actions.phonies);
    let actions = &generated.actions;
    if actions.variables.is_empty() && actions.rules.is_empty() && actions.builds.is_empty() {
      continue;
    }
    let info = input.graph.info(id);
    let variant = info.variant_name();
    scopes.push(Scope {
      prefix: module_prefix(info.name(), &variant),
      header: Header::Module {
        name: info.name().to_string(),
        variant,
        type_name: info.type_name().to_string(),
        pos: info.pos().to_string(),
      },
      actions: &generated.actions,
    });
  }
  for singleton in input.singletons {
    phony_sources.push(&singleton.actions.phonies);
    scopes.push(Scope {
      prefix: format!("s.{}.", sanitize(&singleton.name)),
      header: Header::Singleton(singleton.name.clone()),
      actions: &singleton.actions,
    });
  }

  let mut assembler = Assembler {
    config: input.config,
    pctxs: BTreeMap::new(),
    live: LiveGlobals::default(),
    diags: Vec::new(),
  };
  let all_pctxs = input
    .modules
    .values()
    .flat_map(|g| g.pctxs.iter())
    .chain(input.singletons.iter().flat_map(|s| s.pctxs.iter()));
  for &pctx in all_pctxs {
    match assembler.pctxs.get(pctx.name()) {
      Some(existing) if !std::ptr::eq(*existing, pctx) => {
        assembler
          .diags
          .push(Diagnostic::internal(format!("two package contexts are named {:?}", pctx.name())));
      }
      Some(_) => {}
      None => {
        assembler.pctxs.insert(pctx.name(), pctx);
      }
    }
  }
  for scope in &scopes {
    assembler.mark_scope(scope.actions);
  }

  let mut phonies: BTreeMap<String, Vec<String>> = BTreeMap::new();
  for (name, deps) in phony_sources.into_iter().flatten() {
    let entry = phonies.entry(name.clone()).or_default();
    for dep in deps {
      if !entry.contains(dep) {
        entry.push(dep.clone());
      }
    }
  }
  let outputs: HashSet<&String> = scopes
    .iter()
    .flat_map(|s| s.actions.builds.iter())
    .flat_map(BuildDef::all_outputs)
    .collect();
  for name in phonies.keys() {
    if outputs.contains(name) {
      assembler.diags.push(Diagnostic::internal(format!(
        "phony target {:?} is also the output of a build statement",
        name
      )));
    }
  }

  if !assembler.diags.is_empty() {
    return Err(assembler.diags);
  }
  let Assembler { pctxs, live, .. } = assembler;

  let mut w = NinjaWriter::new();
  write_header(&mut w, &pctxs);
  w.assign("ninja_required_version", NINJA_REQUIRED_VERSION);
  w.blank_line();
  w.assign("builddir", &ninja_escape(&input.config.out_dir));
  w.blank_line();

  for (name, depth) in &live.pools {
    w.pool(name, *depth);
  }
  w.blank_line();

  for (pkg, name) in variable_order(&live.variables) {
    let value = &live.variables[&(pkg, name.clone())];
    w.assign(&global_name(pkg, &name), &value.render(&|v| var_name("", v)));
  }
  w.blank_line();

  for ((pkg, name), rule) in &live.rules {
    write_rule(&mut w, &global_name(pkg, name), rule, "");
    w.blank_line();
  }

  let mut defaults = Vec::new();
  for scope in &scopes {
    write_scope(&mut w, scope);
    for build in scope.actions.builds.iter().filter(|b| b.default) {
      defaults.extend(build.outputs.iter().cloned());
    }
  }

  if !defaults.is_empty() {
    w.default(&escape_all(&defaults));
    w.blank_line();
  }

  for (name, deps) in &phonies {
    w.build("phony", &[ninja_escape(name)], &[], &escape_all(deps), &[], &[], &[]);
  }
  w.blank_line();

  for path in input.subninjas {
    w.subninja(&ninja_escape(path));
  }

  debug!(
    variables = live.variables.len(),
    rules = live.rules.len(),
    pools = live.pools.len(),
    scopes = scopes.len(),
    phonies = phonies.len(),
    "assembled manifest"
  );
  Ok(w.finish())
}

fn write_header(w: &mut NinjaWriter, pctxs: &BTreeMap<&'static str, &'static PackageContext>) {
  let stars = "*".repeat(78);
  w.raw_comment(&stars);
  w.raw_comment(&format!("***{:^72}***", "This file is generated and should not be edited"));
  w.raw_comment(&stars);
  w.raw_comment("");
  w.comment(
    "This file contains variables, rules, and pools with name prefixes indicating they were generated by the following packages:",
  );
  w.raw_comment("");
  for name in pctxs.keys() {
    w.raw_comment(&format!("  {}", name));
  }
  w.blank_line();
}

/// Dependencies before the variables referencing them; otherwise sorted.
fn variable_order(variables: &BTreeMap<(&'static str, String), NinjaString>) -> Vec<(&'static str, String)> {
  fn visit(
    key: &(&'static str, String),
    variables: &BTreeMap<(&'static str, String), NinjaString>,
    seen: &mut BTreeSet<(&'static str, String)>,
    out: &mut Vec<(&'static str, String)>,
  ) {
    if !seen.insert(key.clone()) {
      return;
    }
    if let Some(value) = variables.get(key) {
      for var in value.refs() {
        if let VarRef::Global { pkg, name } = var {
          visit(&(*pkg, name.clone()), variables, seen, out);
        }
      }
    }
    out.push(key.clone());
  }

  let mut seen = BTreeSet::new();
  let mut out = Vec::with_capacity(variables.len());
  for key in variables.keys() {
    visit(key, variables, &mut seen, &mut out);
  }
  out
}

fn write_rule(w: &mut NinjaWriter, name: &str, rule: &ResolvedRule, prefix: &str) {
  let render = |s: &NinjaString| s.render(&|v| var_name(prefix, v));
  w.rule(name);
  w.scoped_assign("command", &render(&rule.command));
  for (key, value) in [
    ("description", &rule.description),
    ("depfile", &rule.depfile),
    ("rspfile", &rule.rspfile),
    ("rspfile_content", &rule.rspfile_content),
  ] {
    if !value.is_empty() {
      w.scoped_assign(key, &render(value));
    }
  }
  if let Some(deps) = rule.deps.as_str() {
    w.scoped_assign("deps", deps);
  }
  if rule.restat {
    w.scoped_assign("restat", "1");
  }
  if rule.generator {
    w.scoped_assign("generator", "1");
  }
  if let Some(pool) = &rule.pool {
    w.scoped_assign("pool", &pool_name(pool));
  }
}

fn write_scope(w: &mut NinjaWriter, scope: &Scope<'_>) {
  w.raw_comment(&"# ".repeat(39).trim_end().to_string());
  match &scope.header {
    Header::Module {
      name,
      variant,
      type_name,
      pos,
    } => {
      w.raw_comment(&format!("Module:  {}", name));
      w.raw_comment(&format!("Variant: {}", variant));
      w.raw_comment(&format!("Type:    {}", type_name));
      w.raw_comment(&format!("Defined: {}", pos));
    }
    Header::Singleton(name) => w.raw_comment(&format!("Singleton: {}", name)),
  }
  w.blank_line();

  let render = |s: &NinjaString| s.render(&|v| var_name(&scope.prefix, v));
  for (name, value) in &scope.actions.variables {
    w.assign(&format!("{}{}", scope.prefix, name), &render(value));
  }
  if !scope.actions.variables.is_empty() {
    w.blank_line();
  }
  for (name, rule) in &scope.actions.rules {
    write_rule(w, &format!("{}{}", scope.prefix, name), rule, &scope.prefix);
    w.blank_line();
  }
  for build in &scope.actions.builds {
    w.build(
      &rule_name(&scope.prefix, &build.rule),
      &escape_all(&build.outputs),
      &escape_all(&build.implicit_outputs),
      &escape_all(&build.inputs),
      &escape_all(&build.implicits),
      &escape_all(&build.order_only),
      &escape_all(&build.validations),
    );
    for (name, value) in build.vars.iter().chain(&build.args) {
      w.scoped_assign(name, &render(value));
    }
    w.blank_line();
  }
}
