//! The context a module's action generator runs with.

use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::Diagnostic;
use crate::fs::is_glob;
use crate::graph::{DepView, Graph, ModuleId, ModuleInfo, PendingProvider, ProviderKey, Variations, WalkStep, Walker};
use crate::module::{ModuleBase, Partition};
use crate::mutators::SOURCE_TAG;
use crate::platform::Target;
use crate::proptools::shell_escape;

use super::actions::{ActionBuilder, BuildDef, DeclareError, ModuleActions};
use super::install::{BUILTIN, OUTPUT_FILES, PackagingSpec, install_root, join_path, relative_to};
use super::ninja_string::NinjaString;
use super::params::{BuildParams, Rule, RuleParams};
use super::pctx::PackageContext;

/// Split `:name` or `:name{.tag}` into the module name and output tag.
pub fn parse_module_reference(s: &str) -> Option<(&str, &str)> {
  let rest = s.strip_prefix(':')?;
  if let Some(open) = rest.find('{')
    && rest.ends_with('}')
  {
    let tag = &rest[open + 1..rest.len() - 1];
    return Some((&rest[..open], tag.strip_prefix('.').unwrap_or(tag)));
  }
  Some((rest, ""))
}

/// What one variant's generator produced.
pub(crate) struct GeneratedActions {
  pub(crate) actions: ModuleActions,
  pub(crate) errors: Vec<Diagnostic>,
  pub(crate) providers: Vec<PendingProvider>,
  pub(crate) installs: Vec<PackagingSpec>,
  pub(crate) checkbuild: Vec<String>,
  pub(crate) glob_dirs: Vec<String>,
  pub(crate) pctxs: Vec<&'static PackageContext>,
}

pub struct ModuleContext<'a> {
  graph: &'a Graph,
  id: ModuleId,
  config: &'a Config,
  target: Option<Target>,
  partition: Partition,
  skip_install: bool,
  builder: ActionBuilder,
  errors: Vec<Diagnostic>,
  providers: Vec<PendingProvider>,
  missing_deps: Vec<String>,
  installs: Vec<PackagingSpec>,
  checkbuild: Vec<String>,
  glob_dirs: Vec<String>,
}

impl<'a> ModuleContext<'a> {
  pub(crate) fn new(graph: &'a Graph, id: ModuleId, config: &'a Config, base: &ModuleBase) -> Self {
    Self {
      graph,
      id,
      config,
      target: base.target(),
      partition: base.common.partition().unwrap_or_default(),
      skip_install: base.common.skip_install,
      builder: ActionBuilder::default(),
      errors: Vec::new(),
      providers: Vec::new(),
      missing_deps: graph.info(id).missing_deps.clone(),
      installs: Vec::new(),
      checkbuild: Vec::new(),
      glob_dirs: Vec::new(),
    }
  }

  fn info(&self) -> &'a ModuleInfo {
    self.graph.info(self.id)
  }

  fn walker(&self) -> Walker<'a> {
    Walker::new(self.graph, self.id)
  }

  pub fn module_name(&self) -> &'a str {
    &self.info().name
  }

  pub fn module_type(&self) -> &'a str {
    &self.info().type_name
  }

  pub fn module_dir(&self) -> &'a str {
    &self.info().dir
  }

  pub fn variations(&self) -> &'a Variations {
    &self.info().variations
  }

  pub fn variant_name(&self) -> String {
    self.info().variant_name()
  }

  pub fn config(&self) -> &'a Config {
    self.config
  }

  pub fn target(&self) -> Option<Target> {
    self.target
  }

  pub fn partition(&self) -> Partition {
    self.partition
  }

  /// `<intermediates>/<dir>/<name>/<variant>`
  pub fn module_out_dir(&self) -> String {
    let variant = self.variant_name();
    join_path(&[&self.config.intermediates_dir(), self.module_dir(), self.module_name(), &variant])
  }

  pub fn gen_dir(&self) -> String {
    join_path(&[&self.module_out_dir(), "gen"])
  }

  pub fn module_errorf(&mut self, message: impl Into<String>) {
    let diag = Diagnostic::module(self.info().pos.clone(), message);
    self.errors.push(diag);
  }

  pub fn property_errorf(&mut self, property: &str, message: impl Into<String>) {
    let diag = Diagnostic::property(self.info().property_pos(property), property, message);
    self.errors.push(diag);
  }

  pub(crate) fn error(&mut self, diag: Diagnostic) {
    self.errors.push(diag);
  }

  pub fn failed(&self) -> bool {
    self.errors.iter().any(Diagnostic::is_error)
  }

  pub fn provider<T: Send + Sync + 'static>(&self, key: &ProviderKey<T>) -> Option<&'a T> {
    self.info().providers.get(key)
  }

  pub fn other_module_provider<T: Send + Sync + 'static>(&self, dep: &DepView<'_>, key: &ProviderKey<T>) -> Option<&'a T> {
    self.walker().provider(dep.id(), key)
  }

  pub fn set_provider<T: Send + Sync + 'static>(&mut self, key: &ProviderKey<T>, value: T) {
    self.providers.push(PendingProvider::new(key, value));
  }

  pub fn visit_direct_deps(&self, f: impl FnMut(DepView<'a>)) {
    self.walker().visit_direct_deps(f)
  }

  pub fn visit_direct_deps_if(&self, pred: impl Fn(&DepView<'a>) -> bool, f: impl FnMut(DepView<'a>)) {
    self.walker().visit_direct_deps_if(pred, f)
  }

  pub fn walk_deps(&self, f: impl FnMut(&WalkStep<'a>) -> bool) {
    self.walker().walk_deps(f)
  }

  pub fn visit_all_variants(&self, f: impl FnMut(ModuleId, &'a ModuleInfo)) {
    self.walker().visit_all_variants(f)
  }

  /// Record dependencies that do not exist. Every build statement of the
  /// module is replaced by one that fails with a message naming them.
  pub fn add_missing_dependencies(&mut self, names: &[String]) {
    for name in names {
      if !self.missing_deps.contains(name) {
        self.missing_deps.push(name.clone());
      }
    }
  }

  pub(crate) fn missing_deps(&self) -> &[String] {
    &self.missing_deps
  }

  fn declare_error(&mut self, err: DeclareError) {
    let diag = match err {
      DeclareError::Invalid(msg) => Diagnostic::module(self.info().pos.clone(), msg).fatal(),
      DeclareError::Scope(msg) => Diagnostic::module(self.info().pos.clone(), msg),
      DeclareError::Internal(msg) => Diagnostic::internal(msg),
    };
    self.errors.push(diag);
  }

  /// Declare a variable scoped to this module.
  pub fn variable(&mut self, pctx: &'static PackageContext, name: &str, value: &str) {
    if let Err(err) = self.builder.variable(pctx, name, value) {
      self.declare_error(err);
    }
  }

  /// Declare a rule only this module can use.
  pub fn rule(&mut self, pctx: &'static PackageContext, name: &str, params: RuleParams, args: &[&str]) -> Rule {
    match self.builder.rule(pctx, name, params, args) {
      Ok(rule) => rule,
      Err(err) => {
        self.declare_error(err);
        Rule::Local(name.to_string())
      }
    }
  }

  /// Declare one build statement. Its outputs are built by `<name>-checkbuild`.
  pub fn build(&mut self, pctx: &'static PackageContext, params: BuildParams) {
    if self.declare(pctx, &params) {
      self.checkbuild.extend(params.all_outputs());
    }
  }

  fn declare(&mut self, pctx: &'static PackageContext, params: &BuildParams) -> bool {
    match self.builder.build(pctx, params) {
      Ok(()) => true,
      Err(err) => {
        self.declare_error(err);
        false
      }
    }
  }

  /// Add to a phony target; repeated calls accumulate.
  pub fn phony(&mut self, name: &str, deps: &[String]) {
    self.builder.phony(name, deps);
  }

  /// Build `path` as part of `<name>-checkbuild` without declaring it here.
  pub fn checkbuild_file(&mut self, path: &str) {
    self.checkbuild.push(path.to_string());
  }

  /// Stop this variant from installing anything.
  pub fn skip_install(&mut self) {
    self.skip_install = true;
  }

  fn install_path(&self, dir: &str, name: &str) -> (String, String) {
    let relative = join_path(&[dir, name]);
    let root = install_root(self.config, self.target, self.partition);
    let path = join_path(&[&root, &relative]);
    (relative, path)
  }

  fn install(&mut self, dir: &str, name: &str, src: &str, executable: bool) -> String {
    let (relative_path, path) = self.install_path(dir, name);
    if self.skip_install {
      return path;
    }
    let rule = if executable { &BUILTIN.cp_executable } else { &BUILTIN.cp };
    let params = BuildParams {
      rule: rule.clone(),
      output: path.clone(),
      input: src.to_string(),
      ..Default::default()
    };
    if self.declare(&BUILTIN.pctx, &params) {
      self.installs.push(PackagingSpec {
        relative_path,
        install_path: path.clone(),
        src: src.to_string(),
        executable,
        symlink_target: None,
      });
    }
    path
  }

  /// Copy `src` to `<install root>/<dir>/<name>`.
  pub fn install_file(&mut self, dir: &str, name: &str, src: &str) -> String {
    self.install(dir, name, src, false)
  }

  pub fn install_executable(&mut self, dir: &str, name: &str, src: &str) -> String {
    self.install(dir, name, src, true)
  }

  /// Install a relative symlink at `<dir>/<name>` pointing at the installed
  /// file `target`.
  pub fn install_symlink(&mut self, dir: &str, name: &str, target: &str) -> String {
    let (relative_path, path) = self.install_path(dir, name);
    if self.skip_install {
      return path;
    }
    let from = relative_to(&path, target);
    let params = BuildParams {
      rule: BUILTIN.symlink.clone(),
      output: path.clone(),
      symlink_output: path.clone(),
      order_only: vec![target.to_string()],
      args: BTreeMap::from([("fromPath".to_string(), from.clone())]),
      ..Default::default()
    };
    if self.declare(&BUILTIN.pctx, &params) {
      self.installs.push(PackagingSpec {
        relative_path,
        install_path: path.clone(),
        src: String::new(),
        executable: false,
        symlink_target: Some(from),
      });
    }
    path
  }

  /// Record `src` as packaged at `<dir>/<name>` without copying it into the
  /// install tree.
  pub fn package_file(&mut self, dir: &str, name: &str, src: &str) -> String {
    let (relative_path, path) = self.install_path(dir, name);
    self.installs.push(PackagingSpec {
      relative_path,
      install_path: path.clone(),
      src: src.to_string(),
      executable: false,
      symlink_target: None,
    });
    path
  }

  /// Resolve a source list relative to the module directory.
  ///
  /// `:module` and `:module{.tag}` entries expand to the output files of a
  /// source dependency, globs expand against the source tree (their
  /// directories are recorded for the manifest dep file), and plain paths
  /// must exist.
  pub fn expand_sources(&mut self, property: &str, srcs: &[String], excludes: &[String]) -> Vec<String> {
    let dir = self.module_dir();
    let excludes: Vec<String> = excludes
      .iter()
      .filter(|e| !e.starts_with(':'))
      .map(|e| join_path(&[dir, e]))
      .collect();
    let mut out = Vec::new();

    for src in srcs {
      if let Some((name, tag)) = parse_module_reference(src) {
        out.extend(self.module_outputs(property, name, tag));
        continue;
      }
      let path = join_path(&[dir, src]);
      if is_glob(src) {
        match self.config.glob(&path, &excludes) {
          Ok(result) => {
            out.extend(result.matches);
            self.glob_dirs.extend(result.dirs);
          }
          Err(err) => self.property_errorf(property, err.to_string()),
        }
      } else if excludes.contains(&path) {
        continue;
      } else if self.config.fs().exists(&path) {
        out.push(path);
      } else if self.config.allow_missing_dependencies {
        self.add_missing_dependencies(&[path]);
      } else {
        self.property_errorf(property, format!("module source path {:?} does not exist", path));
      }
    }
    out
  }

  fn module_outputs(&mut self, property: &str, name: &str, tag: &str) -> Vec<String> {
    let mut found = None;
    self.visit_direct_deps_if(
      |dep| dep.tag() == SOURCE_TAG && dep.name() == name,
      |dep| {
        if found.is_none() {
          found = Some(dep);
        }
      },
    );
    let Some(dep) = found else {
      if self.config.allow_missing_dependencies {
        self.add_missing_dependencies(&[name.to_string()]);
      } else {
        self.property_errorf(property, format!("missing dependency on {:?}, is the property annotated with path?", name));
      }
      return Vec::new();
    };
    if !dep.enabled() {
      self.property_errorf(property, format!("depends on disabled module {:?}", name));
      return Vec::new();
    }
    match dep.provider(&OUTPUT_FILES).map(|files| files.get(tag)) {
      Some(Some(files)) => files.to_vec(),
      Some(None) => {
        self.property_errorf(property, format!("module {:?} has no outputs tagged {:?}", name, tag));
        Vec::new()
      }
      None => {
        self.property_errorf(property, format!("module {:?} is not a source file producer", name));
        Vec::new()
      }
    }
  }

  /// Hand over everything declared, replacing the build statements with
  /// failing ones when dependencies are missing.
  pub(crate) fn finish(mut self) -> GeneratedActions {
    if !self.missing_deps.is_empty() {
      self.replace_with_error_actions();
    }
    GeneratedActions {
      actions: self.builder.actions,
      errors: self.errors,
      providers: self.providers,
      installs: self.installs,
      checkbuild: self.checkbuild,
      glob_dirs: self.glob_dirs,
      pctxs: self.builder.pctxs,
    }
  }

  fn replace_with_error_actions(&mut self) {
    let info = self.info();
    let variant = info.variant_name();
    let mut message = format!("module {:?}", info.name);
    if !variant.is_empty() {
      message.push_str(&format!(" variant {:?}", variant));
    }
    message.push_str(&format!(" missing dependencies: {}", self.missing_deps.join(", ")));
    let args = vec![("error".to_string(), NinjaString::literal(&shell_escape(&message)))];

    if self.builder.actions.builds.is_empty() {
      let mut file = info.name.clone();
      if !variant.is_empty() {
        file = format!("{}_{}", file, variant);
      }
      let output = join_path(&[&self.config.out_dir, "soong", ".missing_deps", &file]);
      self.checkbuild.push(output.clone());
      self.builder.actions.builds.push(BuildDef {
        rule: BUILTIN.error.clone(),
        outputs: vec![output],
        implicit_outputs: Vec::new(),
        inputs: Vec::new(),
        implicits: Vec::new(),
        order_only: Vec::new(),
        validations: Vec::new(),
        vars: Vec::new(),
        args,
        default: false,
      });
    } else {
      for build in &mut self.builder.actions.builds {
        build.rule = BUILTIN.error.clone();
        build.inputs.clear();
        build.implicits.clear();
        build.order_only.clear();
        build.validations.clear();
        build.vars.clear();
        build.args = args.clone();
      }
    }
    self.installs.clear();
    self.builder.use_pctx(&BUILTIN.pctx);
  }
}
