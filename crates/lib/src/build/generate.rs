//! The generate stage: every enabled variant declares its build actions.
//!
//! Variants run in bottom-up waves, so providers a dependency publishes while
//! generating are visible to its dependents. Within a wave generators run in
//! parallel; results are committed in wave order.

use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Diagnostic;
use crate::graph::{Direction, Graph, ModuleId, check_cycles, compute_waves, panic_message};
use crate::module::Module;

use super::context::{GeneratedActions, ModuleContext};
use super::depset::{DepSet, DepSetOrder};
use super::install::{INSTALL_INFO, InstallInfo, PackagingSpec};

/// Run every enabled variant's generator. Returns what each produced, keyed
/// by variant.
pub(crate) fn generate_build_actions(
  graph: &mut Graph,
  config: &Config,
) -> (BTreeMap<ModuleId, GeneratedActions>, Vec<Diagnostic>) {
  let mut generated = BTreeMap::new();
  let Ok(waves) = compute_waves(graph, Direction::BottomUp) else {
    return (generated, check_cycles(graph).into_iter().collect());
  };

  let mut diags = Vec::new();
  for (index, wave) in waves.into_iter().enumerate() {
    let enabled: Vec<ModuleId> = wave.into_iter().filter(|id| graph.info(*id).enabled).collect();
    let jobs: Vec<(ModuleId, Box<dyn Module>)> = enabled
      .into_iter()
      .filter_map(|id| graph.info_mut(id).module.take().map(|m| (id, m)))
      .collect();
    debug!(wave = index, modules = jobs.len(), "generating build actions");

    let shared: &Graph = graph;
    let results: Vec<_> = jobs
      .into_par_iter()
      .map(|(id, mut module)| {
        let generated = generate_one(shared, config, id, module.as_mut());
        (id, module, generated)
      })
      .collect();

    for (id, module, mut actions) in results {
      let info = graph.info(id);
      diags.extend(mem::take(&mut actions.errors).into_iter().map(|d| info.attribute(d)));
      let install_info = collect_install_info(graph, id, &actions.installs);

      let info = graph.info_mut(id);
      info.module = Some(module);
      for provider in mem::take(&mut actions.providers) {
        if let Err(msg) = info.providers.publish(provider.id, provider.value) {
          diags.push(info.attribute(Diagnostic::internal(msg)));
        }
      }
      if info.providers.get(&INSTALL_INFO).is_none() {
        let provider = crate::graph::PendingProvider::new(&INSTALL_INFO, install_info);
        if let Err(msg) = info.providers.publish(provider.id, provider.value) {
          diags.push(info.attribute(Diagnostic::internal(msg)));
        }
      }
      generated.insert(id, actions);
    }
  }

  diags.extend(check_duplicate_outputs(graph, &generated));
  let builds: usize = generated.values().map(|g| g.actions.builds.len()).sum();
  info!(modules = generated.len(), builds, "generated build actions");
  (generated, diags)
}

fn generate_one(graph: &Graph, config: &Config, id: ModuleId, module: &mut dyn Module) -> GeneratedActions {
  let mut ctx = ModuleContext::new(graph, id, config, module.base());
  if let Err(msg) = module.base().common.partition() {
    ctx.module_errorf(msg);
  }

  let mut disabled = Vec::new();
  ctx.visit_direct_deps(|dep| {
    let is_defaults = dep.module().is_some_and(|m| m.base().is_defaults_module());
    if !dep.enabled() && !is_defaults && !disabled.contains(&dep.name().to_string()) {
      disabled.push(dep.name().to_string());
    }
  });
  if !disabled.is_empty() {
    if config.allow_missing_dependencies {
      ctx.add_missing_dependencies(&disabled);
    } else {
      for name in &disabled {
        ctx.module_errorf(format!("depends on disabled module {:?}", name));
      }
    }
  }

  if ctx.missing_deps().is_empty() && !ctx.failed() {
    let type_name = graph.info(id).type_name.clone();
    let result = catch_unwind(AssertUnwindSafe(|| module.generate_build_actions(&mut ctx)));
    if let Err(payload) = result {
      ctx.error(Diagnostic::internal(format!(
        "panic in {} build actions: {}",
        type_name,
        panic_message(&*payload)
      )));
    }
  }
  ctx.finish()
}

/// Own installs plus everything installed by dependencies over install edges,
/// dependencies first.
fn collect_install_info(graph: &Graph, id: ModuleId, installs: &[PackagingSpec]) -> InstallInfo {
  let mut paths = Vec::new();
  let mut specs = Vec::new();
  for edge in graph.deps(id) {
    if !edge.tag.install {
      continue;
    }
    if let Some(dep) = graph.info(edge.target).providers.get(&INSTALL_INFO) {
      paths.push(dep.install_paths.clone());
      specs.push(dep.packaging_specs.clone());
    }
  }
  InstallInfo {
    install_paths: DepSet::new(
      DepSetOrder::Postorder,
      installs.iter().map(|s| s.install_path.clone()).collect(),
      paths,
    ),
    packaging_specs: DepSet::new(DepSetOrder::Postorder, installs.to_vec(), specs),
  }
}

/// Every path may be produced by one build statement only.
fn check_duplicate_outputs(graph: &Graph, generated: &BTreeMap<ModuleId, GeneratedActions>) -> Vec<Diagnostic> {
  let mut diags = Vec::new();
  let mut owners: HashMap<&str, ModuleId> = HashMap::new();
  for (id, output) in module_outputs(graph, generated) {
    match owners.get(output) {
      Some(&first) => {
        let info = graph.info(id);
        let other = graph.info(first);
        let msg = format!(
          "output {:?} is already produced by module {:?} at {}",
          output, other.name, other.pos
        );
        diags.push(info.attribute(Diagnostic::module(info.pos.clone(), msg)));
      }
      None => {
        owners.insert(output, id);
      }
    }
  }
  diags
}

/// Every build output of every live module, in graph order.
pub(crate) fn module_outputs<'a>(
  graph: &'a Graph,
  generated: &'a BTreeMap<ModuleId, GeneratedActions>,
) -> impl Iterator<Item = (ModuleId, &'a str)> + 'a {
  graph
    .live_modules()
    .into_iter()
    .filter_map(move |id| generated.get(&id).map(|g| (id, g)))
    .flat_map(|(id, g)| {
      g.actions
        .builds
        .iter()
        .flat_map(|b| b.all_outputs())
        .map(move |output| (id, output.as_str()))
    })
}
