//! The built-in mutator pipeline.
//!
//! These run in order ahead of any mutator registered by the caller:
//!
//! 1. `defaults_deps` - edges to every module named in `defaults`
//! 2. `defaults` - prepends the properties of the transitive defaults
//! 3. `arch` - one variant per host and device target
//! 4. `arch_props` - `arch`, `multilib` and `target` overlays
//! 5. `product_variables` - overlays enabled by product variables
//! 6. `path_deps` - edges for `:module` references in `path` fields
//! 7. `deps` - the module type's own dependencies and `required`
//! 8. `visibility` - checks every edge against the target's `visibility`

mod arch;
mod defaults;
mod deps;
mod visibility;

use crate::graph::{DependencyTag, MutatorDef};

pub use visibility::VisibilityRule;

/// Edge from a module to a defaults module named in its `defaults`.
pub const DEFAULTS_TAG: DependencyTag = DependencyTag::new("defaults");

/// Edge from a module to a module referenced as `:name` in a source list.
pub const SOURCE_TAG: DependencyTag = DependencyTag::new("source");

/// Edge from a module to a module named in `required`; the dependency's
/// installed files are installed with the module.
pub const REQUIRED_TAG: DependencyTag = DependencyTag::new("required").install();

/// Edge from a module to a host tool it runs while building.
pub const TOOL_TAG: DependencyTag = DependencyTag::new("tool");

/// The mutators every run starts with.
pub fn builtin_mutators() -> Vec<MutatorDef> {
  vec![
    MutatorDef::bottom_up("defaults_deps", defaults::defaults_deps),
    MutatorDef::top_down("defaults", defaults::apply_defaults),
    MutatorDef::bottom_up("arch", arch::split_targets),
    MutatorDef::bottom_up("arch_props", arch::apply_arch_overlays),
    MutatorDef::bottom_up("product_variables", arch::apply_product_variables),
    MutatorDef::bottom_up("path_deps", deps::path_deps),
    MutatorDef::bottom_up("deps", deps::module_deps),
    MutatorDef::bottom_up("visibility", visibility::check_visibility),
  ]
}
