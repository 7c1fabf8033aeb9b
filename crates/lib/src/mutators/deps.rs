use crate::build::parse_module_reference;
use crate::graph::{DependencyTag, MutatorContext};
use crate::module::Module;
use crate::proptools::{Tags, walk_fields};

use super::{REQUIRED_TAG, SOURCE_TAG};

/// Names referenced as `:name` or `:name{tag}` from `path` fields.
fn path_references(module: &dyn Module) -> Vec<String> {
  let mut names: Vec<String> = Vec::new();
  for root in module.property_roots() {
    walk_fields(root, &mut |_, field, value| {
      if !field.tags.contains(Tags::PATH) {
        return;
      }
      for s in value.strings() {
        if let Some((name, _)) = parse_module_reference(s)
          && !names.iter().any(|n| n == name)
        {
          names.push(name.to_string());
        }
      }
    });
  }
  names
}

/// Modules without a target are not split, so they take the first variant
/// of whatever they depend on.
fn add_dep(ctx: &mut MutatorContext<'_>, module: &dyn Module, tag: DependencyTag, name: &str) {
  if module.base().target().is_some() {
    ctx.add_dependency(tag, name);
  } else {
    ctx.add_far_variation_dependency(tag, &[], name);
  }
}

pub(super) fn path_deps(ctx: &mut MutatorContext<'_>, module: &mut dyn Module) {
  if module.base().is_defaults_module() {
    return;
  }
  for name in path_references(module) {
    add_dep(ctx, module, SOURCE_TAG, &name);
  }
}

/// The module type's own dependencies, then `required`.
pub(super) fn module_deps(ctx: &mut MutatorContext<'_>, module: &mut dyn Module) {
  if module.base().is_defaults_module() {
    return;
  }
  module.dependencies(ctx);
  for name in module.base().common.required.clone() {
    add_dep(ctx, module, REQUIRED_TAG, &name);
  }
}
