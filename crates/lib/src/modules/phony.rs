use crate::build::ModuleContext;
use crate::module::{ArchSupport, Module, ModuleBase};
use crate::proptools::PropertyStruct;

/// A name for the modules in its `required` list.
///
/// It builds nothing itself; `<name>` and `<name>-install` cover everything
/// its required modules install.
#[derive(Debug, Clone)]
pub struct Phony {
  base: ModuleBase,
}

impl Phony {
  pub fn new() -> Self {
    Self {
      base: ModuleBase::new(ArchSupport::Common),
    }
  }
}

impl Default for Phony {
  fn default() -> Self {
    Self::new()
  }
}

impl Module for Phony {
  crate::module_accessors!();

  fn property_roots(&self) -> Vec<&dyn PropertyStruct> {
    vec![&self.base.common]
  }

  fn property_roots_mut(&mut self) -> Vec<&mut dyn PropertyStruct> {
    vec![&mut self.base.common]
  }

  fn generate_build_actions(&mut self, _ctx: &mut ModuleContext<'_>) {}
}
