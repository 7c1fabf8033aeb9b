//! Singletons: generators that run once, after every module, with a view of
//! the whole graph.

use std::collections::{BTreeMap, HashMap};

use crate::config::Config;
use crate::consts::{CHECKBUILD_TARGET, DEVICE_TARGET, HOST_TARGET, MODULES_IN_PREFIX};
use crate::error::Diagnostic;
use crate::graph::{Graph, ModuleId, ModuleInfo, ProviderKey};
use crate::platform::OsClass;

use super::actions::{ActionBuilder, DeclareError, ModuleActions};
use super::context::GeneratedActions;
use super::generate::module_outputs;
use super::install::{INSTALL_INFO, PackagingSpec};
use super::params::{BuildParams, Rule, RuleParams};
use super::pctx::PackageContext;

pub trait Singleton: Send + Sync {
  fn generate_build_actions(&mut self, ctx: &mut SingletonContext<'_>);
}

/// Creates a fresh singleton for one run.
pub type SingletonFactory = std::sync::Arc<dyn Fn() -> Box<dyn Singleton> + Send + Sync>;

pub struct SingletonContext<'a> {
  name: &'a str,
  graph: &'a Graph,
  config: &'a Config,
  generated: &'a BTreeMap<ModuleId, GeneratedActions>,
  builder: ActionBuilder,
  errors: Vec<Diagnostic>,
}

/// What one singleton declared.
pub(crate) struct SingletonOutput {
  pub(crate) name: String,
  pub(crate) actions: ModuleActions,
  pub(crate) pctxs: Vec<&'static PackageContext>,
}

impl<'a> SingletonContext<'a> {
  pub(crate) fn new(
    name: &'a str,
    graph: &'a Graph,
    config: &'a Config,
    generated: &'a BTreeMap<ModuleId, GeneratedActions>,
  ) -> Self {
    Self {
      name,
      graph,
      config,
      generated,
      builder: ActionBuilder::default(),
      errors: Vec::new(),
    }
  }

  pub fn name(&self) -> &str {
    self.name
  }

  pub fn config(&self) -> &'a Config {
    self.config
  }

  /// Every live variant in emission order.
  pub fn visit_all_modules(&self, mut f: impl FnMut(ModuleId, &'a ModuleInfo)) {
    for id in self.graph.live_modules() {
      f(id, self.graph.info(id));
    }
  }

  pub fn module_provider<T: Send + Sync + 'static>(&self, id: ModuleId, key: &ProviderKey<T>) -> Option<&'a T> {
    self.graph.info(id).providers.get(key)
  }

  /// Files a variant's `<name>-checkbuild` target builds.
  pub fn module_checkbuild(&self, id: ModuleId) -> &'a [String] {
    self.generated.get(&id).map(|g| g.checkbuild.as_slice()).unwrap_or(&[])
  }

  /// Files a variant installs itself, excluding its dependencies.
  pub fn module_installs(&self, id: ModuleId) -> &'a [PackagingSpec] {
    self.generated.get(&id).map(|g| g.installs.as_slice()).unwrap_or(&[])
  }

  pub fn errorf(&mut self, message: impl Into<String>) {
    self.errors.push(Diagnostic::user(format!("singleton {:?}: {}", self.name, message.into())));
  }

  fn declare_error(&mut self, err: DeclareError) {
    match err {
      DeclareError::Internal(msg) => self.errors.push(Diagnostic::internal(msg)),
      other => self.errorf(other.to_string()),
    }
  }

  pub fn variable(&mut self, pctx: &'static PackageContext, name: &str, value: &str) {
    if let Err(err) = self.builder.variable(pctx, name, value) {
      self.declare_error(err);
    }
  }

  pub fn rule(&mut self, pctx: &'static PackageContext, name: &str, params: RuleParams, args: &[&str]) -> Rule {
    match self.builder.rule(pctx, name, params, args) {
      Ok(rule) => rule,
      Err(err) => {
        self.declare_error(err);
        Rule::Local(name.to_string())
      }
    }
  }

  pub fn build(&mut self, pctx: &'static PackageContext, params: BuildParams) {
    if let Err(err) = self.builder.build(pctx, &params) {
      self.declare_error(err);
    }
  }

  pub fn phony(&mut self, name: &str, deps: &[String]) {
    self.builder.phony(name, deps);
  }

  pub(crate) fn finish(self) -> (SingletonOutput, Vec<Diagnostic>) {
    let output = SingletonOutput {
      name: self.name.to_string(),
      actions: self.builder.actions,
      pctxs: self.builder.pctxs,
    };
    (output, self.errors)
  }
}

/// Singleton build outputs may not collide with module outputs or with the
/// outputs of an earlier singleton.
pub(crate) fn check_singleton_outputs(
  graph: &Graph,
  generated: &BTreeMap<ModuleId, GeneratedActions>,
  singletons: &[SingletonOutput],
) -> Vec<Diagnostic> {
  let mut modules: HashMap<&str, ModuleId> = HashMap::new();
  for (id, output) in module_outputs(graph, generated) {
    modules.entry(output).or_insert(id);
  }
  let mut earlier: HashMap<&str, &str> = HashMap::new();
  let mut diags = Vec::new();
  for singleton in singletons {
    for output in singleton.actions.builds.iter().flat_map(|b| b.all_outputs()) {
      let owner = if let Some(&id) = modules.get(output.as_str()) {
        let info = graph.info(id);
        format!("module {:?} at {}", info.name, info.pos)
      } else if let Some(other) = earlier.get(output.as_str()) {
        format!("singleton {:?}", other)
      } else {
        earlier.insert(output.as_str(), singleton.name.as_str());
        continue;
      };
      diags.push(Diagnostic::user(format!(
        "singleton {:?}: output {:?} is already produced by {}",
        singleton.name, output, owner
      )));
    }
  }
  diags
}

/// Phony targets for building and installing modules by name or directory.
///
/// - `<name>-checkbuild`: every file the module's variants build or install
/// - `<name>-install`: every file installed, including required modules
/// - `<name>`: the install target when anything is installed, else checkbuild
/// - `MODULES-IN-<dir>`: the modules of a directory and its subdirectories
/// - `checkbuild`, `host`, `target`: roots
#[derive(Debug, Default)]
pub struct BuildTargetsSingleton;

#[derive(Default)]
struct NamedTargets {
  dir: String,
  checkbuild: Vec<String>,
  install: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, items: impl IntoIterator<Item = String>) {
  for item in items {
    if !list.contains(&item) {
      list.push(item);
    }
  }
}

/// `a/b/c` becomes `MODULES-IN-a-b-c`.
pub(crate) fn dir_target(dir: &str) -> String {
  format!("{}-{}", MODULES_IN_PREFIX, dir.replace('/', "-"))
}

impl Singleton for BuildTargetsSingleton {
  fn generate_build_actions(&mut self, ctx: &mut SingletonContext<'_>) {
    let mut names: Vec<(String, NamedTargets)> = Vec::new();
    let mut host = Vec::new();
    let mut target = Vec::new();

    ctx.visit_all_modules(|id, info| {
      if !info.enabled() {
        return;
      }
      let installed: Vec<String> = ctx
        .module_provider(id, &INSTALL_INFO)
        .map(|i| i.install_paths.to_list())
        .unwrap_or_default();
      match info.module().and_then(|m| m.base().os_class()) {
        Some(OsClass::Host) => push_unique(&mut host, installed.iter().cloned()),
        Some(OsClass::Device) => push_unique(&mut target, installed.iter().cloned()),
        None => {}
      }

      let index = match names.iter().position(|(n, _)| n == info.name()) {
        Some(index) => index,
        None => {
          let targets = NamedTargets {
            dir: info.dir().to_string(),
            ..Default::default()
          };
          names.push((info.name().to_string(), targets));
          names.len() - 1
        }
      };
      let entry = &mut names[index].1;
      push_unique(&mut entry.checkbuild, ctx.module_checkbuild(id).iter().cloned());
      push_unique(&mut entry.checkbuild, ctx.module_installs(id).iter().map(|s| s.install_path.clone()));
      push_unique(&mut entry.install, installed);
    });

    let mut dirs: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut checkbuild = Vec::new();
    for (name, targets) in &names {
      if targets.checkbuild.is_empty() && targets.install.is_empty() {
        continue;
      }
      let checkbuild_target = format!("{}-checkbuild", name);
      if !targets.checkbuild.is_empty() {
        ctx.phony(&checkbuild_target, &targets.checkbuild);
        checkbuild.push(checkbuild_target);
      }
      if !targets.install.is_empty() {
        ctx.phony(&format!("{}-install", name), &targets.install);
        ctx.phony(name, &targets.install);
      } else {
        ctx.phony(name, &targets.checkbuild);
      }
      if !targets.dir.is_empty() {
        dirs.entry(targets.dir.clone()).or_default().push(name.clone());
      }
    }

    // every ancestor of a directory with modules gets a target, so each one
    // can chain to its parent
    let with_modules: Vec<String> = dirs.keys().cloned().collect();
    for dir in with_modules {
      let mut current = dir.as_str();
      while let Some((parent, _)) = current.rsplit_once('/') {
        dirs.entry(parent.to_string()).or_default();
        current = parent;
      }
    }
    for (dir, modules) in &dirs {
      let mut deps = modules.clone();
      let prefix = format!("{}/", dir);
      deps.extend(
        dirs
          .keys()
          .filter(|d| d.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('/')))
          .map(|d| dir_target(d)),
      );
      ctx.phony(&dir_target(dir), &deps);
      if !dir.contains('/') {
        checkbuild.push(dir_target(dir));
      }
    }

    ctx.phony(CHECKBUILD_TARGET, &checkbuild);
    ctx.phony(HOST_TARGET, &host);
    ctx.phony(DEVICE_TARGET, &target);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::build::{ModuleActions, generate::generate_build_actions};
  use crate::testutil::{graph_with, test_config};

  fn phony<'a>(actions: &'a ModuleActions, name: &str) -> Option<&'a [String]> {
    actions.phonies.iter().find(|(n, _)| n == name).map(|(_, d)| d.as_slice())
  }

  #[test]
  fn module_and_directory_targets() {
    let mut graph = graph_with(&["a", "b", "c"]);
    graph.info_mut(ModuleId(0)).dir = "vendor/x".to_string();
    graph.info_mut(ModuleId(1)).dir = "vendor".to_string();
    let config = test_config();
    let (mut generated, diags) = generate_build_actions(&mut graph, &config);
    assert!(diags.is_empty());

    let a = generated.get_mut(&ModuleId(0)).unwrap();
    a.checkbuild.push("out/a.o".to_string());
    a.installs.push(PackagingSpec {
      relative_path: "bin/a".to_string(),
      install_path: "out/system/bin/a".to_string(),
      src: "out/a".to_string(),
      executable: true,
      symlink_target: None,
    });
    generated.get_mut(&ModuleId(1)).unwrap().checkbuild.push("out/b.o".to_string());

    let mut ctx = SingletonContext::new("build_targets", &graph, &config, &generated);
    BuildTargetsSingleton.generate_build_actions(&mut ctx);
    let (output, errors) = ctx.finish();
    assert!(errors.is_empty());
    let actions = &output.actions;

    assert_eq!(phony(actions, "a-checkbuild"), Some(&["out/a.o".to_string(), "out/system/bin/a".to_string()][..]));
    assert_eq!(phony(actions, "b"), Some(&["out/b.o".to_string()][..]));
    assert_eq!(phony(actions, "c"), None);
    assert_eq!(
      phony(actions, "MODULES-IN-vendor"),
      Some(&["b".to_string(), "MODULES-IN-vendor-x".to_string()][..])
    );
    assert_eq!(phony(actions, "MODULES-IN-vendor-x"), Some(&["a".to_string()][..]));
    assert_eq!(
      phony(actions, "checkbuild"),
      Some(&["a-checkbuild".to_string(), "b-checkbuild".to_string(), "MODULES-IN-vendor".to_string()][..])
    );
  }
}
