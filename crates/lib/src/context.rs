//! Run orchestration.
//!
//! A [`Context`] holds the registries a run needs (module types, mutators
//! and singletons) and drives one run through its stages:
//!
//! 1. Parse every listed build file (in parallel)
//! 2. Create modules in definition order and unpack their properties
//! 3. Run the mutators in registration order
//! 4. Generate each enabled variant's build actions
//! 5. Run the singletons
//! 6. Assemble the manifest text
//!
//! Each stage is a barrier. When a stage reports an error the run stops at
//! its end, returning every diagnostic the stage collected (at most
//! [`MAX_ERRORS`]).

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::build::{BuildTargetsSingleton, Singleton, SingletonContext, SingletonFactory, check_singleton_outputs};
use crate::build::generate::generate_build_actions;
use crate::config::Config;
use crate::consts::{MAX_ERRORS, SYSROOT_ENV};
use crate::error::{BlueprintError, Diagnostic};
use crate::graph::{Graph, MutatorDef, check_cycles, panic_message, run_mutator};
use crate::module::{ModuleFactory, split_overlays, validate_name, validate_overlays};
use crate::modules::builtin_module_types;
use crate::mutators::builtin_mutators;
use crate::ninja::{ManifestInput, write_manifest};
use crate::parser::{self, File, ModuleDef};
use crate::proptools::unpack_properties;

/// How long one stage took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageTiming {
  pub stage: String,
  #[serde(rename = "micros", serialize_with = "as_micros")]
  pub duration: Duration,
}

fn as_micros<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
  s.serialize_u64(u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
}

/// Everything a successful run produced.
#[derive(Debug)]
pub struct RunOutput {
  /// The manifest text.
  pub manifest: String,
  /// Files whose change invalidates the manifest: build files, then every
  /// directory a glob listed.
  pub deps: Vec<String>,
  pub graph: Graph,
  pub stages: Vec<StageTiming>,
  /// Non-fatal diagnostics.
  pub warnings: Vec<Diagnostic>,
}

/// The registries for one run.
pub struct Context {
  module_types: BTreeMap<String, ModuleFactory>,
  mutators: Vec<MutatorDef>,
  singletons: Vec<(String, SingletonFactory)>,
}

impl Default for Context {
  fn default() -> Self {
    Self::new()
  }
}

impl Context {
  /// A context with the built-in module types, mutators and singletons.
  pub fn new() -> Self {
    let mut ctx = Self::empty();
    for (name, factory) in builtin_module_types() {
      ctx.register_module_type(name, factory);
    }
    for mutator in builtin_mutators() {
      ctx.register_mutator(mutator);
    }
    ctx.register_singleton(
      "build_targets",
      std::sync::Arc::new(|| Box::new(BuildTargetsSingleton) as Box<dyn Singleton>),
    );
    ctx
  }

  /// A context with nothing registered.
  pub fn empty() -> Self {
    Self {
      module_types: BTreeMap::new(),
      mutators: Vec::new(),
      singletons: Vec::new(),
    }
  }

  pub fn register_module_type(&mut self, name: &str, factory: ModuleFactory) {
    self.module_types.insert(name.to_string(), factory);
  }

  /// Mutators run in registration order, after any registered before.
  pub fn register_mutator(&mut self, mutator: MutatorDef) {
    self.mutators.push(mutator);
  }

  pub fn register_singleton(&mut self, name: &str, factory: SingletonFactory) {
    self.singletons.push((name.to_string(), factory));
  }

  pub fn module_types(&self) -> impl Iterator<Item = &str> {
    self.module_types.keys().map(String::as_str)
  }

  /// Run every stage over `build_files`, paths relative to the source root.
  pub fn run(&self, config: &Config, build_files: &[String]) -> Result<RunOutput, BlueprintError> {
    let mut stages = Stages::default();
    let mut warnings = Vec::new();

    let (files, diags) = stages.time("parse", || parse_files(config, build_files));
    let files = check(files, diags, &mut warnings)?;

    let mut graph = Graph::new();
    let diags = stages.time("create", || self.create_modules(&mut graph, &files));
    check((), diags, &mut warnings)?;
    info!(files = files.len(), modules = graph.len(), "created modules");

    for mutator in &self.mutators {
      let diags = stages.time(&mutator.name, || run_mutator(&mut graph, config, mutator));
      check((), diags, &mut warnings)?;
    }
    if let Some(cycle) = check_cycles(&graph) {
      return Err(vec![cycle].into());
    }
    info!(mutators = self.mutators.len(), variants = graph.len(), "mutated module graph");

    let (generated, diags) = stages.time("generate", || generate_build_actions(&mut graph, config));
    check((), diags, &mut warnings)?;

    let (singletons, diags) = stages.time("singletons", || {
      let mut outputs = Vec::new();
      let mut diags = Vec::new();
      for (name, factory) in &self.singletons {
        let mut ctx = SingletonContext::new(name, &graph, config, &generated);
        let result = catch_unwind(AssertUnwindSafe(|| factory().generate_build_actions(&mut ctx)));
        let (output, errors) = ctx.finish();
        diags.extend(errors);
        if let Err(payload) = result {
          diags.push(Diagnostic::internal(format!(
            "panic in singleton {:?}: {}",
            name,
            panic_message(&*payload)
          )));
        }
        outputs.push(output);
      }
      diags.extend(check_singleton_outputs(&graph, &generated, &outputs));
      (outputs, diags)
    });
    check((), diags, &mut warnings)?;

    let manifest = stages.time("manifest", || {
      write_manifest(&ManifestInput {
        config,
        graph: &graph,
        modules: &generated,
        singletons: &singletons,
        subninjas: &[],
      })
    });
    let manifest = manifest.map_err(|diags| BlueprintError::Diagnostics(truncate(diags)))?;

    let mut glob_dirs: Vec<String> = generated.values().flat_map(|g| g.glob_dirs.iter().cloned()).collect();
    glob_dirs.sort();
    glob_dirs.dedup();
    let mut deps = build_files.to_vec();
    deps.extend(glob_dirs.into_iter().filter(|d| !build_files.contains(d)));

    info!(bytes = manifest.len(), deps = deps.len(), "assembled manifest");
    Ok(RunOutput {
      manifest,
      deps,
      graph,
      stages: stages.0,
      warnings,
    })
  }

  fn create_modules(&self, graph: &mut Graph, files: &[File]) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for file in files {
      let dir = file.name.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
      for def in file.modules() {
        if let Err(errs) = self.create_module(graph, def, dir) {
          diags.extend(errs);
        }
      }
    }
    diags
  }

  fn create_module(&self, graph: &mut Graph, def: &ModuleDef, dir: &str) -> Result<(), Vec<Diagnostic>> {
    let pos = def.type_pos.clone();
    let Some(factory) = self.module_types.get(&def.type_name) else {
      return Err(vec![Diagnostic::module(
        pos,
        format!("unrecognized module type {:?}", def.type_name),
      )]);
    };
    let mut module = catch_unwind(AssertUnwindSafe(|| factory())).map_err(|payload| {
      vec![
        Diagnostic::internal(format!("panic in {} factory: {}", def.type_name, panic_message(&*payload))).at(pos.clone()),
      ]
    })?;

    let (rest, overlays, errors) = split_overlays(def.properties());
    let mut diags: Vec<Diagnostic> = errors.into_iter().map(Diagnostic::from).collect();
    let properties = match unpack_properties(&rest, &mut module.property_roots_mut()) {
      Ok(properties) => properties,
      Err(errs) => {
        diags.extend(errs.into_iter().map(Diagnostic::from));
        BTreeMap::new()
      }
    };
    module.base_mut().set_overlays(overlays);
    diags.extend(validate_overlays(module.as_ref()).into_iter().map(Diagnostic::from));

    let name = module.name().to_string();
    if let Err(msg) = validate_name(&name) {
      diags.push(Diagnostic::module(pos.clone(), msg));
    }
    if !diags.is_empty() {
      return Err(diags.into_iter().map(|d| d.in_module(name.clone(), "")).collect());
    }

    debug!(module = %name, type_name = %def.type_name, "created module");
    graph
      .add_module(module, &def.type_name, pos, dir, properties)
      .map(|_| ())
      .map_err(|d| vec![d])
  }
}

#[derive(Default)]
struct Stages(Vec<StageTiming>);

impl Stages {
  fn time<T>(&mut self, stage: &str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    let duration = start.elapsed();
    debug!(stage, elapsed = ?duration, "stage finished");
    self.0.push(StageTiming {
      stage: stage.to_string(),
      duration,
    });
    out
  }
}

fn parse_files(config: &Config, build_files: &[String]) -> (Vec<File>, Vec<Diagnostic>) {
  let results: Vec<Result<File, Vec<Diagnostic>>> = build_files
    .par_iter()
    .map(|path| {
      let src = config
        .fs()
        .read_to_string(path)
        .map_err(|err| vec![Diagnostic::io(path, err)])?;
      parser::parse(path, &src).map_err(|errs| errs.into_iter().map(Diagnostic::from).collect())
    })
    .collect();

  let mut files = Vec::new();
  let mut diags = Vec::new();
  for result in results {
    match result {
      Ok(file) => files.push(file),
      Err(errs) => diags.extend(errs),
    }
  }
  (files, diags)
}

/// Split a stage's diagnostics into warnings, kept, and errors, which end the run.
fn check<T>(value: T, diags: Vec<Diagnostic>, warnings: &mut Vec<Diagnostic>) -> Result<T, BlueprintError> {
  let (errors, warns): (Vec<_>, Vec<_>) = diags.into_iter().partition(Diagnostic::is_error);
  for warning in &warns {
    warn!("{}", warning);
  }
  warnings.extend(warns);
  if errors.is_empty() {
    Ok(value)
  } else {
    Err(BlueprintError::Diagnostics(truncate(errors)))
  }
}

fn truncate(mut diags: Vec<Diagnostic>) -> Vec<Diagnostic> {
  diags.truncate(MAX_ERRORS);
  diags
}

/// Split the contents of a build-file list into paths, one per line.
pub fn parse_file_list(contents: &str) -> Result<Vec<String>, BlueprintError> {
  let files: Vec<String> = contents
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty())
    .map(|line| line.strip_prefix("./").unwrap_or(line).to_string())
    .collect();
  if files.is_empty() {
    return Err(vec![Diagnostic::user("no build files listed")].into());
  }
  Ok(files)
}

/// Read `SYSROOT` and remove it from the environment, so that nothing run
/// later observes it.
///
/// # Safety
///
/// No other thread may read or write the environment during the call.
pub unsafe fn take_sysroot() -> Option<String> {
  let value = std::env::var(SYSROOT_ENV).ok();
  if value.is_some() {
    // SAFETY: the caller guarantees exclusive access to the environment.
    unsafe { std::env::remove_var(SYSROOT_ENV) };
  }
  value
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, LazyLock};

  use crate::build::{BuildParams, PackageContext};
  use crate::fs::MockFs;
  use serial_test::serial;

  fn run(files: &[(&str, &str)]) -> Result<RunOutput, BlueprintError> {
    let mut fs = MockFs::new();
    for (path, src) in files {
      fs.add_file(*path, *src);
    }
    let config = Config::for_tests(fs);
    let names: Vec<String> = files.iter().map(|(p, _)| p.to_string()).collect();
    Context::new().run(&config, &names)
  }

  #[test]
  fn file_list_skips_blank_lines() {
    assert_eq!(
      parse_file_list("a/Android.bp\n\n  ./b/Android.bp  \n").unwrap(),
      vec!["a/Android.bp".to_string(), "b/Android.bp".to_string()]
    );
    assert!(parse_file_list("\n \n").is_err());
  }

  #[test]
  fn unknown_module_type() {
    let err = run(&[("a/Android.bp", "cc_library { name: \"x\" }\n")]).unwrap_err();
    assert_eq!(
      err.to_string(),
      "a/Android.bp:1:1: unrecognized module type \"cc_library\""
    );
  }

  #[test]
  fn duplicate_names() {
    let err = run(&[
      ("a/Android.bp", "filegroup { name: \"x\" }\n"),
      ("b/Android.bp", "filegroup { name: \"x\" }\n"),
    ])
    .unwrap_err();
    assert_eq!(
      err.to_string(),
      "b/Android.bp:1:1: module \"x\" already defined at a/Android.bp:1:1"
    );
  }

  #[test]
  fn parse_errors_stop_before_modules_are_created() {
    let err = run(&[
      ("a/Android.bp", "filegroup { name: \"x\" \n"),
      ("b/Android.bp", "filegroup { name: \"y\", srcs: [\"y.txt\"] }\n"),
    ])
    .unwrap_err();
    assert_eq!(err.diagnostics().len(), 1);
    assert!(err.to_string().starts_with("a/Android.bp:"));
  }

  static COLLIDING: LazyLock<PackageContext> = LazyLock::new(|| PackageContext::new("colliding"));

  /// Declares a phony build over every installed file and over `out/shared`.
  struct Colliding;

  impl Singleton for Colliding {
    fn generate_build_actions(&mut self, ctx: &mut SingletonContext<'_>) {
      let mut outputs = Vec::new();
      ctx.visit_all_modules(|id, _| outputs.extend(ctx.module_installs(id).iter().map(|s| s.install_path.clone())));
      outputs.push("out/shared".to_string());
      for output in outputs {
        ctx.build(
          &COLLIDING,
          BuildParams {
            output,
            ..Default::default()
          },
        );
      }
    }
  }

  #[test]
  fn singleton_outputs_must_be_unique() {
    let mut fs = MockFs::new();
    fs.add_file("a/Android.bp", "prebuilt_etc { name: \"p\", src: \"p.conf\" }\n");
    fs.add_file("a/p.conf", "");
    let config = Config::for_tests(fs);
    let mut ctx = Context::new();
    for name in ["first", "second"] {
      ctx.register_singleton(name, Arc::new(|| Box::new(Colliding) as Box<dyn Singleton>));
    }

    let err = ctx.run(&config, &["a/Android.bp".to_string()]).unwrap_err();
    let msgs: Vec<String> = err.diagnostics().iter().map(|d| d.to_string()).collect();
    assert_eq!(msgs.len(), 3, "{:?}", msgs);
    assert!(msgs[0].starts_with("singleton \"first\": output "), "{}", msgs[0]);
    assert!(msgs[0].ends_with("is already produced by module \"p\" at a/Android.bp:1:1"), "{}", msgs[0]);
    assert!(msgs[1].starts_with("singleton \"second\": output "), "{}", msgs[1]);
    assert_eq!(
      msgs[2],
      "singleton \"second\": output \"out/shared\" is already produced by singleton \"first\""
    );
  }

  #[test]
  fn stages_are_timed_in_order() {
    let out = run(&[("a/Android.bp", "filegroup { name: \"x\" }\n")]).unwrap();
    let stages: Vec<&str> = out.stages.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(stages.first(), Some(&"parse"));
    assert_eq!(stages.last(), Some(&"manifest"));
    assert!(stages.contains(&"defaults"));
    assert!(stages.contains(&"visibility"));
    assert_eq!(out.deps, vec!["a/Android.bp".to_string()]);
  }

  #[test]
  #[tracing_test::traced_test]
  fn logs_stage_progress() {
    run(&[("a/Android.bp", "filegroup { name: \"x\" }\n")]).unwrap();
    assert!(logs_contain("created modules"));
    assert!(logs_contain("assembled manifest"));
  }

  #[test]
  #[serial]
  fn sysroot_is_consumed() {
    temp_env::with_var(SYSROOT_ENV, Some("/opt/sysroot"), || {
      // SAFETY: serialised with every other test touching the environment.
      let value = unsafe { take_sysroot() };
      assert_eq!(value.as_deref(), Some("/opt/sysroot"));
      assert!(std::env::var(SYSROOT_ENV).is_err());
    });
  }

  #[test]
  #[serial]
  fn sysroot_absent() {
    temp_env::with_var_unset(SYSROOT_ENV, || {
      // SAFETY: serialised with every other test touching the environment.
      assert_eq!(unsafe { take_sysroot() }, None);
    });
  }
}
