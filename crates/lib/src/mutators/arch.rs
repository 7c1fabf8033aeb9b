//! Target variants and the overlays that specialise them.

use tracing::debug;

use crate::error::Diagnostic;
use crate::graph::MutatorContext;
use crate::module::{ArchSupport, Module, Overlay, OverlayAxis, overlay::apply_overlay};
use crate::platform::{OsClass, Target};

/// Targets a module is built for, device targets first.
fn module_targets(ctx: &MutatorContext<'_>, module: &dyn Module) -> Vec<Target> {
  let base = module.base();
  let support = base.arch_support();
  let config = ctx.config();

  let device = support != ArchSupport::HostOnly
    && base.common.device_supported.unwrap_or(support.device_default());
  let host = support != ArchSupport::DeviceOnly && base.common.host_supported.unwrap_or(support.host_default());

  let mut targets = Vec::new();
  if device {
    targets.extend(base.multilib().select(&config.device_targets));
  }
  if host {
    targets.extend(config.host_targets.iter().take(1).copied());
  }
  targets
}

/// Split every arch-aware module into one variant per target.
///
/// A module with no matching target ends up with no variants and is
/// disabled.
pub(super) fn split_targets(ctx: &mut MutatorContext<'_>, module: &mut dyn Module) {
  if module.base().is_defaults_module() || module.base().arch_support() == ArchSupport::Common {
    return;
  }
  let targets = module_targets(ctx, module);
  let names: Vec<String> = targets.iter().map(Target::variation).collect();
  if targets.is_empty() {
    debug!(module = ctx.module_name(), "no targets, disabling");
  }
  let variants = ctx.create_variations(module, &names);
  for (variant, target) in variants.into_iter().zip(targets) {
    variant.base_mut().set_target(target);
  }
}

/// Overlay keys that apply to `target`, in application order.
fn overlay_keys(target: Target) -> Vec<(OverlayAxis, &'static str)> {
  let mut keys = vec![
    (OverlayAxis::Arch, target.arch.as_str()),
    (OverlayAxis::Multilib, target.arch.multilib()),
  ];
  if target.class() == OsClass::Host {
    keys.push((OverlayAxis::Target, "host"));
  }
  if target.os.is_linux() {
    keys.push((OverlayAxis::Target, "linux"));
  }
  keys.push((OverlayAxis::Target, target.os.as_str()));
  keys
}

fn apply(ctx: &mut MutatorContext<'_>, module: &mut dyn Module, overlay: &Overlay, substitution: Option<&str>) {
  if let Err(errors) = apply_overlay(module, overlay, substitution) {
    for err in errors {
      ctx.error(Diagnostic::from(err));
    }
  }
}

/// Merge the `arch`, `multilib` and `target` overlays matching the
/// variant's target onto its properties.
pub(super) fn apply_arch_overlays(ctx: &mut MutatorContext<'_>, module: &mut dyn Module) {
  let Some(target) = module.base().target() else {
    return;
  };
  let overlays: Vec<Overlay> = overlay_keys(target)
    .into_iter()
    .flat_map(|(axis, key)| {
      module
        .base()
        .overlays()
        .iter()
        .filter(move |o| o.axis == axis && o.key == key)
        .cloned()
        .collect::<Vec<_>>()
    })
    .collect();
  for overlay in &overlays {
    apply(ctx, module, overlay, None);
  }
}

/// Merge the `product_variables` overlays whose variable is set.
///
/// `%s` and `%d` in the overlay's strings are replaced by the variable's
/// value when it is a string or an integer.
pub(super) fn apply_product_variables(ctx: &mut MutatorContext<'_>, module: &mut dyn Module) {
  let overlays: Vec<Overlay> = module
    .base()
    .overlays()
    .iter()
    .filter(|o| o.axis == OverlayAxis::ProductVariables)
    .cloned()
    .collect();
  let vars = &ctx.config().product_variables;
  for overlay in &overlays {
    let Some(value) = vars.get(&overlay.key) else {
      continue;
    };
    if !value.is_set() {
      continue;
    }
    let substitution = value.substitution();
    apply(ctx, module, overlay, substitution.as_deref());
  }
}
