use crate::build::{ModuleContext, OUTPUT_FILES, OutputFiles};
use crate::module::{ArchSupport, Module, ModuleBase};
use crate::property_struct;
use crate::proptools::PropertyStruct;

property_struct! {
  pub struct FilegroupProperties {
    /// Files in the group, relative to the module directory. Globs and
    /// `:module` references are expanded.
    pub srcs: Vec<String> => [arch_variant, path],

    pub exclude_srcs: Vec<String> => [arch_variant, path],
  }
}

/// A named list of source files.
#[derive(Debug, Clone)]
pub struct Filegroup {
  base: ModuleBase,
  pub props: FilegroupProperties,
}

impl Filegroup {
  pub fn new() -> Self {
    Self {
      base: ModuleBase::new(ArchSupport::Common),
      props: FilegroupProperties::default(),
    }
  }
}

impl Default for Filegroup {
  fn default() -> Self {
    Self::new()
  }
}

impl Module for Filegroup {
  crate::module_accessors!();

  fn property_roots(&self) -> Vec<&dyn PropertyStruct> {
    vec![&self.base.common, &self.props]
  }

  fn property_roots_mut(&mut self) -> Vec<&mut dyn PropertyStruct> {
    vec![&mut self.base.common, &mut self.props]
  }

  fn generate_build_actions(&mut self, ctx: &mut ModuleContext<'_>) {
    let srcs = ctx.expand_sources("srcs", &self.props.srcs, &self.props.exclude_srcs);
    ctx.set_provider(&OUTPUT_FILES, OutputFiles::new(srcs));
  }
}
