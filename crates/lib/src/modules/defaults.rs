use crate::build::ModuleContext;
use crate::module::{Module, ModuleBase};
use crate::proptools::PropertyStruct;

/// A module that only carries properties for others to inherit through
/// `defaults`. It is never split and declares no build actions.
#[derive(Debug, Clone)]
pub struct DefaultsModule {
  base: ModuleBase,
  props: Vec<Box<dyn PropertyStruct>>,
}

impl DefaultsModule {
  /// `props` are the property roots of the module type being defaulted,
  /// without the common properties.
  pub fn new(props: Vec<Box<dyn PropertyStruct>>) -> Self {
    Self {
      base: ModuleBase::defaults(),
      props,
    }
  }
}

impl Module for DefaultsModule {
  crate::module_accessors!();

  fn property_roots(&self) -> Vec<&dyn PropertyStruct> {
    let mut roots: Vec<&dyn PropertyStruct> = vec![&self.base.common];
    roots.extend(self.props.iter().map(|p| p.as_ref()));
    roots
  }

  fn property_roots_mut(&mut self) -> Vec<&mut dyn PropertyStruct> {
    let mut roots: Vec<&mut dyn PropertyStruct> = vec![&mut self.base.common];
    roots.extend(self.props.iter_mut().map(|p| p.as_mut() as &mut dyn PropertyStruct));
    roots
  }

  fn generate_build_actions(&mut self, _ctx: &mut ModuleContext<'_>) {}
}
