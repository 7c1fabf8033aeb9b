//! Mutator stages.
//!
//! A mutator runs once on every live variant. Variants are scheduled in
//! waves (see [`compute_waves`]); within a wave each variant's module is
//! taken out of the arena and handed to a worker together with a
//! [`MutatorContext`] that can read the rest of the graph but only records
//! changes. The recorded changes are committed in wave order once every
//! worker of the wave has finished, so the result does not depend on thread
//! scheduling.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Diagnostic;
use crate::module::Module;
use crate::parser::Pos;

use super::{
  DepEdge, DepView, DependencyTag, Direction, Graph, LookupError, ModuleId, ModuleInfo, PendingProvider,
  ProviderKey, Variation, Variations, WalkStep, Walker, compute_waves,
};

pub type MutatorFn = Arc<dyn Fn(&mut MutatorContext<'_>, &mut dyn Module) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatorKind {
  /// Dependencies are visited before their dependents.
  BottomUp,
  /// Dependents are visited before their dependencies.
  TopDown,
}

/// A registered mutator.
#[derive(Clone)]
pub struct MutatorDef {
  pub name: String,
  pub kind: MutatorKind,
  pub(crate) func: MutatorFn,
  pub parallel: bool,
}

impl fmt::Debug for MutatorDef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MutatorDef")
      .field("name", &self.name)
      .field("kind", &self.kind)
      .field("parallel", &self.parallel)
      .finish()
  }
}

impl MutatorDef {
  pub fn bottom_up(
    name: impl Into<String>,
    func: impl Fn(&mut MutatorContext<'_>, &mut dyn Module) + Send + Sync + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      kind: MutatorKind::BottomUp,
      func: Arc::new(func),
      parallel: true,
    }
  }

  pub fn top_down(
    name: impl Into<String>,
    func: impl Fn(&mut MutatorContext<'_>, &mut dyn Module) + Send + Sync + 'static,
  ) -> Self {
    Self {
      kind: MutatorKind::TopDown,
      ..Self::bottom_up(name, func)
    }
  }

  /// Run the mutator on one variant at a time.
  pub fn sequential(mut self) -> Self {
    self.parallel = false;
    self
  }
}

struct DepRequest {
  tag: DependencyTag,
  name: String,
  variations: Variations,
  far: bool,
}

struct SplitVariant {
  name: String,
  module: Box<dyn Module>,
}

#[derive(Default)]
struct Outcome {
  errors: Vec<Diagnostic>,
  deps: Vec<DepRequest>,
  reverse_deps: Vec<(DependencyTag, String)>,
  providers: Vec<PendingProvider>,
  split: Option<Vec<SplitVariant>>,
  rename: Option<String>,
  disable: bool,
}

/// What a mutator sees of the graph while it runs on one variant.
pub struct MutatorContext<'a> {
  graph: &'a Graph,
  id: ModuleId,
  config: &'a Config,
  mutator: &'a str,
  outcome: Outcome,
}

impl<'a> MutatorContext<'a> {
  fn new(graph: &'a Graph, id: ModuleId, config: &'a Config, mutator: &'a str) -> Self {
    Self {
      graph,
      id,
      config,
      mutator,
      outcome: Outcome::default(),
    }
  }

  fn info(&self) -> &'a ModuleInfo {
    self.graph.info(self.id)
  }

  fn walker(&self) -> Walker<'a> {
    Walker::new(self.graph, self.id)
  }

  pub fn id(&self) -> ModuleId {
    self.id
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

  pub fn pos(&self) -> &'a Pos {
    &self.info().pos
  }

  pub fn variations(&self) -> &'a Variations {
    &self.info().variations
  }

  pub fn config(&self) -> &'a Config {
    self.config
  }

  pub fn mutator_name(&self) -> &'a str {
    self.mutator
  }

  /// A provider this variant published in an earlier stage.
  pub fn provider<T: Send + Sync + 'static>(&self, key: &ProviderKey<T>) -> Option<&'a T> {
    self.info().providers.get(key)
  }

  pub fn other_module_provider<T: Send + Sync + 'static>(&self, dep: &DepView<'_>, key: &ProviderKey<T>) -> Option<&'a T> {
    self.walker().provider(dep.id(), key)
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

  /// Depend on the variant of `name` matching this variant's variations.
  pub fn add_dependency(&mut self, tag: DependencyTag, name: &str) {
    self.add_variation_dependency(tag, &[], name);
  }

  /// Depend on `name` with `overrides` merged over this variant's variations.
  pub fn add_variation_dependency(&mut self, tag: DependencyTag, overrides: &[Variation], name: &str) {
    self.outcome.deps.push(DepRequest {
      tag,
      name: name.to_string(),
      variations: Variations::from(overrides),
      far: false,
    });
  }

  /// Depend on the variants of `name` carrying all of `variations`,
  /// regardless of this variant's own variations.
  pub fn add_far_variation_dependency(&mut self, tag: DependencyTag, variations: &[Variation], name: &str) {
    self.outcome.deps.push(DepRequest {
      tag,
      name: name.to_string(),
      variations: Variations::from(variations),
      far: true,
    });
  }

  /// Make `parent` depend on this variant. Applied at the end of the stage.
  pub fn add_reverse_dependency(&mut self, tag: DependencyTag, parent: &str) {
    self.outcome.reverse_deps.push((tag, parent.to_string()));
  }

  /// Replace this variant with one variant per name, each starting as a copy
  /// of `module`. The copies are returned in order for per-variant changes.
  ///
  /// Splitting into no variants disables the module.
  pub fn create_variations(&mut self, module: &dyn Module, names: &[String]) -> Vec<&mut dyn Module> {
    if self.outcome.split.is_some() {
      self.outcome.errors.push(Diagnostic::internal(format!(
        "mutator {:?} created variations twice",
        self.mutator
      )));
      return Vec::new();
    }
    if names.is_empty() {
      self.outcome.disable = true;
      return Vec::new();
    }
    let variants = names
      .iter()
      .map(|name| SplitVariant {
        name: name.clone(),
        module: module.clone_module(),
      })
      .collect();
    let split = self.outcome.split.insert(variants);
    split.iter_mut().map(|v| v.module.as_mut() as &mut dyn Module).collect()
  }

  pub fn rename(&mut self, name: &str) {
    self.outcome.rename = Some(name.to_string());
  }

  /// Skip build action generation for this variant.
  pub fn disable(&mut self) {
    self.outcome.disable = true;
  }

  /// Publish a provider on this variant, visible once the wave commits.
  pub fn set_provider<T: Send + Sync + 'static>(&mut self, key: &ProviderKey<T>, value: T) {
    self.outcome.providers.push(PendingProvider::new(key, value));
  }

  pub fn module_errorf(&mut self, message: impl Into<String>) {
    self.outcome.errors.push(Diagnostic::module(self.pos().clone(), message));
  }

  pub fn property_errorf(&mut self, property: &str, message: impl Into<String>) {
    let pos = self.info().property_pos(property);
    self.outcome.errors.push(Diagnostic::property(pos, property, message));
  }

  pub fn error(&mut self, diag: impl Into<Diagnostic>) {
    self.outcome.errors.push(diag.into());
  }

  pub fn failed(&self) -> bool {
    self.outcome.errors.iter().any(Diagnostic::is_error)
  }
}

/// Run one mutator over every live variant of `graph`.
pub(crate) fn run_mutator(graph: &mut Graph, config: &Config, mutator: &MutatorDef) -> Vec<Diagnostic> {
  let direction = match mutator.kind {
    MutatorKind::BottomUp => Direction::BottomUp,
    MutatorKind::TopDown => Direction::TopDown,
  };
  let waves = match compute_waves(graph, direction) {
    Ok(waves) => waves,
    Err(cycle) => return vec![cycle_diagnostic(graph, &cycle)],
  };

  let mut diags = Vec::new();
  let mut reverse = Vec::new();
  let mut renames = Vec::new();
  let mut visited = 0usize;

  for (index, wave) in waves.into_iter().enumerate() {
    let jobs: Vec<(ModuleId, Box<dyn Module>)> = wave
      .into_iter()
      .filter_map(|id| graph.info_mut(id).module.take().map(|m| (id, m)))
      .collect();
    visited += jobs.len();
    debug!(mutator = %mutator.name, wave = index, modules = jobs.len(), "running wave");

    let shared: &Graph = graph;
    let run = |(id, mut module): (ModuleId, Box<dyn Module>)| {
      let mut ctx = MutatorContext::new(shared, id, config, &mutator.name);
      let result = catch_unwind(AssertUnwindSafe(|| (mutator.func)(&mut ctx, module.as_mut())));
      let mut outcome = ctx.outcome;
      if let Err(payload) = result {
        outcome.errors.push(Diagnostic::internal(format!(
          "panic in mutator {:?}: {}",
          mutator.name,
          panic_message(&*payload)
        )));
      }
      (id, module, outcome)
    };
    let results: Vec<_> = if mutator.parallel {
      jobs.into_par_iter().map(run).collect()
    } else {
      jobs.into_iter().map(run).collect()
    };

    let mut requests = Vec::new();
    let mut split_any = false;
    for (id, module, outcome) in results {
      let Outcome {
        errors,
        deps,
        reverse_deps,
        providers,
        split,
        rename,
        disable,
      } = outcome;

      let info = graph.info(id);
      diags.extend(errors.into_iter().map(|d| info.attribute(d)));

      let mut module = module;
      if disable {
        module.base_mut().common.enabled = Some(false);
      }
      let info = graph.info_mut(id);
      for provider in providers {
        if let Err(msg) = info.providers.publish(provider.id, provider.value) {
          diags.push(info.attribute(Diagnostic::internal(msg)));
        }
      }
      info.enabled = module.base().enabled();
      info.module = Some(module);

      let targets = match split {
        Some(mut variants) => {
          if disable {
            variants.iter_mut().for_each(|v| v.module.base_mut().common.enabled = Some(false));
          }
          split_any = true;
          split_module(graph, id, &mutator.name, variants)
        }
        None => vec![id],
      };
      if let Some(name) = rename {
        renames.push((id, name));
      }
      for &target in &targets {
        reverse.extend(reverse_deps.iter().map(|(tag, parent)| (target, *tag, parent.clone())));
      }
      requests.push((targets, deps));
    }

    if split_any {
      retarget_edges(graph, &mutator.name);
    }
    for (sources, deps) in requests {
      for source in sources {
        for request in &deps {
          add_requested_dep(graph, config, source, request, &mut diags);
        }
      }
    }
  }

  for (child, tag, parent) in reverse {
    let Some(&child) = live_successors(graph, child).first() else {
      continue;
    };
    let child_vars = graph.info(child).variations.clone();
    match graph.find_variants(&parent, &child_vars, false) {
      Ok(parents) => {
        for parent in parents {
          push_edge(graph, parent, tag, child);
        }
      }
      Err(err) => {
        let info = graph.info(child);
        let msg = lookup_message(&parent, err, "reverse dependency on undefined module");
        diags.push(info.attribute(Diagnostic::module(info.pos.clone(), msg)));
      }
    }
  }

  // renamed ids may have been split in a later wave
  for (id, name) in renames {
    let id = live_successors(graph, id).first().copied().unwrap_or(id);
    if let Err(msg) = graph.rename(id, &name) {
      let info = graph.info(id);
      diags.push(info.attribute(Diagnostic::module(info.pos.clone(), msg)));
    }
  }

  debug!(mutator = %mutator.name, visited, "mutator finished");
  diags
}

/// Replace `id` with one new variant per split entry.
fn split_module(graph: &mut Graph, id: ModuleId, mutator: &str, variants: Vec<SplitVariant>) -> Vec<ModuleId> {
  let mut ids = Vec::with_capacity(variants.len());
  for variant in variants {
    let deps = split_deps(graph, id, mutator, &variant.name);
    let old = graph.info(id);
    let new_id = ModuleId(graph.modules.len());
    let info = ModuleInfo {
      name: old.name.clone(),
      type_name: old.type_name.clone(),
      pos: old.pos.clone(),
      dir: old.dir.clone(),
      variations: old.variations.clone().with(mutator, &variant.name),
      enabled: variant.module.base().enabled(),
      module: Some(variant.module),
      deps,
      providers: old.providers.clone(),
      missing_deps: old.missing_deps.clone(),
      group: old.group,
      split_into: None,
      properties: Arc::clone(&old.properties),
    };
    graph.modules.push(info);
    ids.push(new_id);
  }

  let old = graph.info_mut(id);
  old.split_into = Some(ids.clone());
  old.module = None;
  old.deps.clear();
  let group = old.group;
  let variants = &mut graph.groups[group.0].variants;
  if let Some(at) = variants.iter().position(|v| *v == id) {
    variants.remove(at);
    for (offset, new_id) in ids.iter().enumerate() {
      variants.insert(at + offset, *new_id);
    }
  }
  debug!(
    module = %graph.info(ids[0]).name,
    mutator,
    variants = ids.len(),
    "split module"
  );
  ids
}

/// Edges of one new variant of `id`.
///
/// A dependency split earlier by the same mutator had `id`'s edge pointed at
/// its first variant; each new variant takes the sibling with its own value.
fn split_deps(graph: &Graph, id: ModuleId, mutator: &str, value: &str) -> Vec<DepEdge> {
  let mut deps: Vec<DepEdge> = Vec::with_capacity(graph.deps(id).len());
  for edge in graph.deps(id) {
    let target = if edge.tag.fan_out {
      edge.target
    } else {
      matching_sibling(graph, edge.target, mutator, value)
    };
    let edge = DepEdge { tag: edge.tag, target };
    if !deps.contains(&edge) {
      deps.push(edge);
    }
  }
  deps
}

fn matching_sibling(graph: &Graph, target: ModuleId, mutator: &str, value: &str) -> ModuleId {
  let info = graph.info(target);
  if info.variations.get(mutator).is_none_or(|v| v == value) {
    return target;
  }
  let wanted = info.variations.clone().with(mutator, value);
  graph.groups[info.group.0]
    .variants
    .iter()
    .copied()
    .find(|v| graph.info(*v).variations == wanted)
    .unwrap_or(target)
}

/// Live variants that replaced `id`, following repeated splits.
fn live_successors(graph: &Graph, id: ModuleId) -> Vec<ModuleId> {
  match &graph.info(id).split_into {
    None => vec![id],
    Some(next) => next.iter().flat_map(|n| live_successors(graph, *n)).collect(),
  }
}

/// Point edges at split modules to the variants that replaced them.
fn retarget_edges(graph: &mut Graph, mutator: &str) {
  for source in graph.live_modules() {
    if graph.deps(source).iter().all(|e| graph.info(e.target).is_live()) {
      continue;
    }
    let source_value = graph.info(source).variations.get(mutator).map(str::to_string);
    let mut edges = Vec::with_capacity(graph.deps(source).len());
    for edge in graph.deps(source) {
      let successors = live_successors(graph, edge.target);
      let chosen: Vec<ModuleId> = if edge.tag.fan_out {
        successors
      } else {
        let matching = source_value
          .as_deref()
          .and_then(|value| successors.iter().find(|s| graph.info(**s).variations.get(mutator) == Some(value)));
        matching.or(successors.first()).into_iter().copied().collect()
      };
      for target in chosen {
        let edge = DepEdge { tag: edge.tag, target };
        if !edges.contains(&edge) {
          edges.push(edge);
        }
      }
    }
    graph.info_mut(source).deps = edges;
  }
}

fn push_edge(graph: &mut Graph, from: ModuleId, tag: DependencyTag, to: ModuleId) {
  let edge = DepEdge { tag, target: to };
  let deps = &mut graph.info_mut(from).deps;
  if !deps.contains(&edge) {
    deps.push(edge);
  }
}

fn add_requested_dep(graph: &mut Graph, config: &Config, source: ModuleId, request: &DepRequest, diags: &mut Vec<Diagnostic>) {
  let requested = if request.far {
    request.variations.clone()
  } else {
    let mut merged = graph.info(source).variations.clone();
    for v in request.variations.iter() {
      merged.set(&v.mutator, &v.variation);
    }
    merged
  };

  match graph.find_variants(&request.name, &requested, request.far) {
    Ok(found) => {
      let targets = if request.tag.fan_out { found } else { found.into_iter().take(1).collect() };
      for target in targets {
        push_edge(graph, source, request.tag, target);
      }
    }
    Err(LookupError::Undefined) if config.allow_missing_dependencies => {
      let info = graph.info_mut(source);
      warn!(module = %info.name, dependency = %request.name, "missing dependency");
      if !info.missing_deps.contains(&request.name) {
        info.missing_deps.push(request.name.clone());
      }
    }
    Err(err) => {
      let info = graph.info(source);
      let msg = lookup_message(&request.name, err, "depends on undefined module");
      diags.push(info.attribute(Diagnostic::module(info.pos.clone(), msg)));
    }
  }
}

fn lookup_message(name: &str, err: LookupError, undefined: &str) -> String {
  match err {
    LookupError::Undefined => format!("{} {:?}", undefined, name),
    LookupError::MissingVariant(msg) => msg,
  }
}

fn cycle_diagnostic(graph: &Graph, cycle: &[ModuleId]) -> Diagnostic {
  let mut msg = String::from("encountered dependency cycle:");
  for pair in cycle.windows(2) {
    msg.push_str(&format!(
      "\nmodule {:?} depends on module {:?}",
      graph.info(pair[0]).name,
      graph.info(pair[1]).name
    ));
  }
  match cycle.first() {
    Some(&first) => {
      let info = graph.info(first);
      info.attribute(Diagnostic::module(info.pos.clone(), msg))
    }
    None => Diagnostic::internal(msg),
  }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic".to_string()
  }
}

/// Report a dependency cycle anywhere in the graph.
pub(crate) fn check_cycles(graph: &Graph) -> Option<Diagnostic> {
  compute_waves(graph, Direction::BottomUp)
    .err()
    .map(|cycle| cycle_diagnostic(graph, &cycle))
}
