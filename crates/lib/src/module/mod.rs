//! The module abstraction: what a module type implements and the state the
//! framework keeps on every module.

pub mod common;
pub mod overlay;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use common::{CommonProperties, Partition, validate_name};
pub use overlay::{Overlay, OverlayAxis, split_overlays, validate_overlays};

use crate::build::ModuleContext;
use crate::graph::MutatorContext;
use crate::platform::{ArchType, OsClass, Target};
use crate::proptools::PropertyStruct;

/// A module type's implementation.
///
/// Module values are owned by the module graph; each variant holds its own
/// copy, made with [`clone_module`](Module::clone_module) when a mutator
/// splits the module.
pub trait Module: Any + Send + Sync + fmt::Debug {
  fn base(&self) -> &ModuleBase;

  fn base_mut(&mut self) -> &mut ModuleBase;

  /// Every property root, the common properties first.
  fn property_roots(&self) -> Vec<&dyn PropertyStruct>;

  fn property_roots_mut(&mut self) -> Vec<&mut dyn PropertyStruct>;

  fn clone_module(&self) -> Box<dyn Module>;

  /// Add the dependencies this module type needs. Called by the `deps` mutator.
  fn dependencies(&self, _ctx: &mut MutatorContext<'_>) {}

  /// Declare this variant's build actions.
  fn generate_build_actions(&mut self, ctx: &mut ModuleContext<'_>);

  fn as_any(&self) -> &dyn Any;

  fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Module {
  pub fn downcast_ref<T: Module>(&self) -> Option<&T> {
    self.as_any().downcast_ref::<T>()
  }

  pub fn downcast_mut<T: Module>(&mut self) -> Option<&mut T> {
    self.as_any_mut().downcast_mut::<T>()
  }

  pub fn name(&self) -> &str {
    &self.base().common.name
  }
}

/// Implements the accessor methods of [`Module`] for a struct with a
/// `base: ModuleBase` field.
#[macro_export]
macro_rules! module_accessors {
  () => {
    fn base(&self) -> &$crate::module::ModuleBase {
      &self.base
    }

    fn base_mut(&mut self) -> &mut $crate::module::ModuleBase {
      &mut self.base
    }

    fn clone_module(&self) -> Box<dyn $crate::module::Module> {
      Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn ::std::any::Any {
      self
    }

    fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
      self
    }
  };
}

/// Creates a fresh, unpopulated module of one type.
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// Which targets a module type can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchSupport {
  /// Not split by target at all.
  #[default]
  Common,
  DeviceOnly,
  HostOnly,
  /// Device by default, host when `host_supported: true`.
  HostAndDevice,
  /// Both by default; either can be switched off.
  HostAndDeviceDefault,
}

impl ArchSupport {
  pub fn device_default(&self) -> bool {
    matches!(self, Self::DeviceOnly | Self::HostAndDevice | Self::HostAndDeviceDefault)
  }

  pub fn host_default(&self) -> bool {
    matches!(self, Self::HostOnly | Self::HostAndDeviceDefault)
  }
}

/// Which device architectures a module is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Multilib {
  #[default]
  First,
  Both,
  Lib32,
  Lib64,
}

impl Multilib {
  pub fn parse(value: &str) -> Option<Self> {
    match value {
      "first" => Some(Self::First),
      "both" => Some(Self::Both),
      "32" | "lib32" => Some(Self::Lib32),
      "64" | "lib64" => Some(Self::Lib64),
      _ => None,
    }
  }

  /// Filter the configured targets of one OS class.
  pub fn select(&self, targets: &[Target]) -> Vec<Target> {
    match self {
      Self::First => targets.iter().take(1).copied().collect(),
      Self::Both => targets.to_vec(),
      Self::Lib32 => targets.iter().filter(|t| !t.arch.is_64bit()).copied().collect(),
      Self::Lib64 => targets.iter().filter(|t| t.arch.is_64bit()).copied().collect(),
    }
  }
}

/// Framework state stored on every module.
#[derive(Debug, Clone, Default)]
pub struct ModuleBase {
  pub common: CommonProperties,
  arch_support: ArchSupport,
  default_multilib: Multilib,
  overlays: Vec<Overlay>,
  target: Option<Target>,
  defaults_module: bool,
}

impl ModuleBase {
  pub fn new(arch_support: ArchSupport) -> Self {
    Self {
      arch_support,
      ..Self::default()
    }
  }

  /// Base for a module type whose only role is carrying defaults.
  pub fn defaults() -> Self {
    Self {
      defaults_module: true,
      ..Self::default()
    }
  }

  pub fn with_default_multilib(mut self, multilib: Multilib) -> Self {
    self.default_multilib = multilib;
    self
  }

  pub fn arch_support(&self) -> ArchSupport {
    self.arch_support
  }

  pub fn is_defaults_module(&self) -> bool {
    self.defaults_module
  }

  pub fn multilib(&self) -> Multilib {
    self
      .common
      .compile_multilib
      .as_deref()
      .and_then(Multilib::parse)
      .unwrap_or(self.default_multilib)
  }

  pub fn overlays(&self) -> &[Overlay] {
    &self.overlays
  }

  pub(crate) fn set_overlays(&mut self, overlays: Vec<Overlay>) {
    self.overlays = overlays;
  }

  /// Put `overlays` ahead of this module's own.
  pub(crate) fn prepend_overlays(&mut self, overlays: &[Overlay]) {
    let mut merged = overlays.to_vec();
    merged.append(&mut self.overlays);
    self.overlays = merged;
  }

  pub fn target(&self) -> Option<Target> {
    self.target
  }

  pub(crate) fn set_target(&mut self, target: Target) {
    self.common.compile_os = target.os.to_string();
    self.common.compile_arch = target.arch.to_string();
    self.target = Some(target);
  }

  pub fn os_class(&self) -> Option<OsClass> {
    self.target.map(|t| t.class())
  }

  pub fn arch(&self) -> Option<ArchType> {
    self.target.map(|t| t.arch)
  }

  pub fn host(&self) -> bool {
    self.os_class() == Some(OsClass::Host)
  }

  pub fn device(&self) -> bool {
    self.os_class() == Some(OsClass::Device)
  }

  pub fn enabled(&self) -> bool {
    self.common.enabled()
  }
}
