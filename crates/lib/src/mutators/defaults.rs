//! `defaults` support.
//!
//! A module listing defaults modules gets the properties of every defaults
//! module it reaches, directly or through the defaults' own `defaults`,
//! prepended onto its own. Overlays of the defaults are prepended the same
//! way so they apply before the module's own overlays.

use tracing::debug;

use crate::error::Diagnostic;
use crate::graph::MutatorContext;
use crate::module::Module;
use crate::proptools::{ExtendOptions, FilterArgs, Order, PropertyError, extend_matching_properties};

use super::DEFAULTS_TAG;

pub(super) fn defaults_deps(ctx: &mut MutatorContext<'_>, module: &mut dyn Module) {
  for name in module.base().common.defaults.clone() {
    ctx.add_dependency(DEFAULTS_TAG, &name);
  }
}

/// Properties describing the module itself are not inherited.
fn inherited(args: &FilterArgs<'_>) -> Result<bool, PropertyError> {
  Ok(!matches!(args.property, "name" | "defaults" | "visibility"))
}

pub(super) fn apply_defaults(ctx: &mut MutatorContext<'_>, module: &mut dyn Module) {
  if module.base().is_defaults_module() || module.base().common.defaults.is_empty() {
    return;
  }

  let mut chain: Vec<&dyn Module> = Vec::new();
  let mut not_defaults = Vec::new();
  ctx.walk_deps(|step| {
    if step.child.tag() != DEFAULTS_TAG {
      return false;
    }
    match step.child.module() {
      Some(defaults) if defaults.base().is_defaults_module() => {
        if chain.iter().any(|seen| std::ptr::addr_eq(*seen, defaults)) {
          return false;
        }
        chain.push(defaults);
        !defaults.base().common.defaults.is_empty()
      }
      _ => {
        not_defaults.push(step.child.name().to_string());
        false
      }
    }
  });

  for name in not_defaults {
    ctx.property_errorf("defaults", format!("module {:?} is not a defaults module", name));
  }

  let options = ExtendOptions::new(Order::Prepend).filter(&inherited);
  for defaults in &chain {
    for src in defaults.property_roots() {
      let mut roots = module.property_roots_mut();
      if let Err(err) = extend_matching_properties(&mut roots, src, options) {
        ctx.error(Diagnostic::from(err));
      }
    }
    module.base_mut().prepend_overlays(defaults.base().overlays());
  }
  debug!(module = ctx.module_name(), defaults = chain.len(), "applied defaults");
}
