//! The multi-variant module graph.
//!
//! Modules live in an arena indexed by [`ModuleId`]. A [`ModuleGroup`] holds
//! the live variants sharing one name, in creation order. Splitting a module
//! into variants appends new arena entries and marks the old one obsolete;
//! edges that still point at an obsolete entry are retargeted when the
//! mutator wave that split it is committed.

mod mutator;
mod provider;
mod view;
mod waves;

pub use mutator::{MutatorContext, MutatorDef, MutatorFn, MutatorKind};
pub use provider::{ProviderKey, ProviderTable};
pub use view::{DepView, WalkStep};

pub(crate) use mutator::{check_cycles, panic_message, run_mutator};
pub(crate) use provider::PendingProvider;
pub(crate) use view::Walker;
pub(crate) use waves::{Direction, compute_waves};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Diagnostic;
use crate::module::Module;
use crate::parser::{Pos, Property};

/// Arena index of one module variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ModuleId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct GroupId(pub(crate) usize);

/// One (mutator, variation) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Variation {
  pub mutator: String,
  pub variation: String,
}

impl Variation {
  pub fn new(mutator: impl Into<String>, variation: impl Into<String>) -> Self {
    Self {
      mutator: mutator.into(),
      variation: variation.into(),
    }
  }
}

/// The ordered variation vector identifying a variant within its group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Variations(Vec<Variation>);

impl Variations {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, mutator: &str) -> Option<&str> {
    self.0.iter().find(|v| v.mutator == mutator).map(|v| v.variation.as_str())
  }

  /// Set the value for `mutator`, keeping its position if already present.
  pub fn set(&mut self, mutator: &str, variation: &str) {
    match self.0.iter_mut().find(|v| v.mutator == mutator) {
      Some(v) => v.variation = variation.to_string(),
      None => self.0.push(Variation::new(mutator, variation)),
    }
  }

  pub fn with(mut self, mutator: &str, variation: &str) -> Self {
    self.set(mutator, variation);
    self
  }

  /// Every pair of `self` appears in `other`.
  pub fn subset_of(&self, other: &Variations) -> bool {
    self.0.iter().all(|v| other.get(&v.mutator) == Some(v.variation.as_str()))
  }

  pub fn iter(&self) -> impl Iterator<Item = &Variation> {
    self.0.iter()
  }

  pub fn is_empty(&self) -> bool {
    self.0.iter().all(|v| v.variation.is_empty())
  }

  /// Display name of the variant, e.g. `android_arm64`.
  pub fn name(&self) -> String {
    self
      .0
      .iter()
      .filter(|v| !v.variation.is_empty())
      .map(|v| v.variation.as_str())
      .collect::<Vec<_>>()
      .join("_")
  }
}

impl From<&[Variation]> for Variations {
  fn from(v: &[Variation]) -> Self {
    let mut out = Variations::new();
    for var in v {
      out.set(&var.mutator, &var.variation);
    }
    out
  }
}

impl fmt::Display for Variations {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let pairs: Vec<String> = self.0.iter().map(|v| format!("{}:{}", v.mutator, v.variation)).collect();
    f.write_str(&pairs.join(","))
  }
}

/// Describes an edge. Tags compare by value; two edges between the same pair
/// of variants may coexist when their tags differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DependencyTag {
  pub name: &'static str,
  /// Install files of the dependency alongside the dependent.
  pub install: bool,
  /// Edge is ignored by cycle detection and wave ordering.
  pub may_cycle: bool,
  /// Resolve to every matching variant, and keep doing so when the
  /// dependency is split later.
  pub fan_out: bool,
}

impl DependencyTag {
  pub const fn new(name: &'static str) -> Self {
    Self {
      name,
      install: false,
      may_cycle: false,
      fan_out: false,
    }
  }

  pub const fn install(mut self) -> Self {
    self.install = true;
    self
  }

  pub const fn may_cycle(mut self) -> Self {
    self.may_cycle = true;
    self
  }

  pub const fn fan_out(mut self) -> Self {
    self.fan_out = true;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DepEdge {
  pub(crate) tag: DependencyTag,
  pub(crate) target: ModuleId,
}

/// Bookkeeping for one variant.
pub struct ModuleInfo {
  pub(crate) name: String,
  pub(crate) type_name: String,
  pub(crate) pos: Pos,
  /// Directory of the defining build file, relative to the source root.
  pub(crate) dir: String,
  pub(crate) variations: Variations,
  /// Taken out while a worker owns the module.
  pub(crate) module: Option<Box<dyn Module>>,
  pub(crate) deps: Vec<DepEdge>,
  pub(crate) providers: ProviderTable,
  pub(crate) missing_deps: Vec<String>,
  pub(crate) enabled: bool,
  pub(crate) group: GroupId,
  /// Replacement variants once this entry was split.
  pub(crate) split_into: Option<Vec<ModuleId>>,
  pub(crate) properties: Arc<BTreeMap<String, Arc<Property>>>,
}

impl fmt::Debug for ModuleInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ModuleInfo")
      .field("name", &self.name)
      .field("type", &self.type_name)
      .field("variations", &self.variations)
      .field("deps", &self.deps.len())
      .finish_non_exhaustive()
  }
}

impl ModuleInfo {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn type_name(&self) -> &str {
    &self.type_name
  }

  pub fn pos(&self) -> &Pos {
    &self.pos
  }

  pub fn dir(&self) -> &str {
    &self.dir
  }

  pub fn variations(&self) -> &Variations {
    &self.variations
  }

  pub fn variant_name(&self) -> String {
    self.variations.name()
  }

  pub fn module(&self) -> Option<&dyn Module> {
    self.module.as_deref()
  }

  pub fn providers(&self) -> &ProviderTable {
    &self.providers
  }

  pub fn missing_deps(&self) -> &[String] {
    &self.missing_deps
  }

  pub fn enabled(&self) -> bool {
    self.enabled
  }

  /// Position of a property, falling back to the module's position.
  pub fn property_pos(&self, property: &str) -> Pos {
    self
      .properties
      .get(property)
      .map(|p| p.colon_pos.clone())
      .unwrap_or_else(|| self.pos.clone())
  }

  pub(crate) fn is_live(&self) -> bool {
    self.split_into.is_none()
  }

  /// Attribute a diagnostic to this variant.
  pub(crate) fn attribute(&self, diag: Diagnostic) -> Diagnostic {
    let diag = if diag.pos.is_none() { diag.at(self.pos.clone()) } else { diag };
    diag.in_module(self.name.clone(), self.variant_name())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LookupError {
  Undefined,
  MissingVariant(String),
}

#[derive(Debug)]
pub(crate) struct ModuleGroup {
  pub(crate) name: String,
  pub(crate) variants: Vec<ModuleId>,
}

/// The arena of module variants.
#[derive(Debug, Default)]
pub struct Graph {
  pub(crate) modules: Vec<ModuleInfo>,
  pub(crate) groups: Vec<ModuleGroup>,
  pub(crate) names: HashMap<String, GroupId>,
}

impl Graph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a freshly created module as a group with one variant.
  pub(crate) fn add_module(
    &mut self,
    module: Box<dyn Module>,
    type_name: &str,
    pos: Pos,
    dir: &str,
    properties: BTreeMap<String, Arc<Property>>,
  ) -> Result<ModuleId, Diagnostic> {
    let name = module.name().to_string();
    if let Some(&group) = self.names.get(&name) {
      let previous = self.groups[group.0]
        .variants
        .first()
        .map(|id| self.modules[id.0].pos.to_string())
        .unwrap_or_default();
      return Err(Diagnostic::module(pos, format!("module {:?} already defined at {}", name, previous)).fatal());
    }

    let id = ModuleId(self.modules.len());
    let group = GroupId(self.groups.len());
    self.modules.push(ModuleInfo {
      name: name.clone(),
      type_name: type_name.to_string(),
      pos,
      dir: dir.to_string(),
      variations: Variations::new(),
      enabled: module.base().enabled(),
      module: Some(module),
      deps: Vec::new(),
      providers: ProviderTable::default(),
      missing_deps: Vec::new(),
      group,
      split_into: None,
      properties: Arc::new(properties),
    });
    self.groups.push(ModuleGroup {
      name: name.clone(),
      variants: vec![id],
    });
    self.names.insert(name, group);
    Ok(id)
  }

  pub fn info(&self, id: ModuleId) -> &ModuleInfo {
    &self.modules[id.0]
  }

  pub(crate) fn info_mut(&mut self, id: ModuleId) -> &mut ModuleInfo {
    &mut self.modules[id.0]
  }

  /// Live variants in emission order: groups in creation order, variants in
  /// the order they were created.
  pub fn live_modules(&self) -> Vec<ModuleId> {
    self.groups.iter().flat_map(|g| g.variants.iter().copied()).collect()
  }

  pub fn len(&self) -> usize {
    self.groups.iter().map(|g| g.variants.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.groups.is_empty()
  }

  /// Live variants of the module named `name`.
  pub fn variants_of(&self, name: &str) -> &[ModuleId] {
    self
      .names
      .get(name)
      .map(|g| self.groups[g.0].variants.as_slice())
      .unwrap_or(&[])
  }

  pub(crate) fn siblings(&self, id: ModuleId) -> &[ModuleId] {
    &self.groups[self.modules[id.0].group.0].variants
  }

  /// Direct dependencies of a live variant, in insertion order.
  pub(crate) fn deps(&self, id: ModuleId) -> &[DepEdge] {
    &self.modules[id.0].deps
  }

  /// Variants of `name` matching a request.
  ///
  /// A normal request matches a candidate whose variations are all present
  /// in `requested` with equal values. A far request matches a candidate
  /// that carries every requested pair.
  pub(crate) fn find_variants(&self, name: &str, requested: &Variations, far: bool) -> Result<Vec<ModuleId>, LookupError> {
    let Some(&group) = self.names.get(name) else {
      return Err(LookupError::Undefined);
    };
    let candidates = &self.groups[group.0].variants;
    let matched: Vec<ModuleId> = candidates
      .iter()
      .copied()
      .filter(|&c| {
        let variations = &self.modules[c.0].variations;
        if far {
          requested.subset_of(variations)
        } else {
          variations.subset_of(requested)
        }
      })
      .collect();
    if matched.is_empty() {
      let available: Vec<String> = candidates
        .iter()
        .map(|&c| format!("    {}", self.modules[c.0].variations))
        .collect();
      return Err(LookupError::MissingVariant(format!(
        "dependency {:?} missing variant:\n    {}\navailable variants:\n{}",
        name,
        requested,
        available.join("\n")
      )));
    }
    Ok(matched)
  }

  pub(crate) fn rename(&mut self, id: ModuleId, new_name: &str) -> Result<(), String> {
    let group = self.modules[id.0].group;
    let old = self.groups[group.0].name.clone();
    if old == new_name {
      return Ok(());
    }
    if self.names.contains_key(new_name) {
      return Err(format!("renaming module {:?} to {:?} conflicts with existing module", old, new_name));
    }
    self.names.remove(&old);
    self.names.insert(new_name.to_string(), group);
    self.groups[group.0].name = new_name.to_string();
    for variant in self.groups[group.0].variants.clone() {
      self.modules[variant.0].name = new_name.to_string();
      if let Some(module) = self.modules[variant.0].module.as_mut() {
        module.base_mut().common.name = new_name.to_string();
      }
    }
    Ok(())
  }

  /// Serialisable view of every live variant.
  pub fn dump(&self) -> Vec<ModuleDump> {
    self
      .live_modules()
      .into_iter()
      .map(|id| {
        let info = self.info(id);
        ModuleDump {
          name: info.name.clone(),
          type_name: info.type_name.clone(),
          variant: info.variant_name(),
          variations: info.variations.clone(),
          pos: info.pos.to_string(),
          enabled: info.enabled,
          deps: info
            .deps
            .iter()
            .map(|edge| {
              let dep = self.info(edge.target);
              DepDump {
                name: dep.name.clone(),
                variant: dep.variant_name(),
                tag: edge.tag.name,
              }
            })
            .collect(),
        }
      })
      .collect()
  }
}

#[derive(Debug, Serialize)]
pub struct ModuleDump {
  pub name: String,
  #[serde(rename = "type")]
  pub type_name: String,
  pub variant: String,
  pub variations: Variations,
  pub pos: String,
  pub enabled: bool,
  pub deps: Vec<DepDump>,
}

#[derive(Debug, Serialize)]
pub struct DepDump {
  pub name: String,
  pub variant: String,
  pub tag: &'static str,
}
