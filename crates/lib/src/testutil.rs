//! Test utilities for blueprint-lib.

use std::collections::BTreeMap;

use crate::build::ModuleContext;
use crate::config::Config;
use crate::fs::MockFs;
use crate::graph::Graph;
use crate::module::{ArchSupport, Module, ModuleBase};
use crate::parser::Pos;
use crate::proptools::PropertyStruct;
use crate::{module_accessors, property_struct};

property_struct! {
  pub struct TestProperties {
    pub srcs: Vec<String> => [arch_variant, path],
    pub deps: Vec<String>,
  }
}

/// A module type with no behavior of its own.
#[derive(Debug, Clone)]
pub struct TestModule {
  pub base: ModuleBase,
  pub props: TestProperties,
}

impl TestModule {
  pub fn new(name: &str) -> Self {
    let mut base = ModuleBase::new(ArchSupport::Common);
    base.common.name = name.to_string();
    Self {
      base,
      props: TestProperties::default(),
    }
  }
}

impl Module for TestModule {
  module_accessors!();

  fn property_roots(&self) -> Vec<&dyn PropertyStruct> {
    vec![&self.base.common, &self.props]
  }

  fn property_roots_mut(&mut self) -> Vec<&mut dyn PropertyStruct> {
    vec![&mut self.base.common, &mut self.props]
  }

  fn generate_build_actions(&mut self, _ctx: &mut ModuleContext<'_>) {}
}

/// A graph with one unsplit [`TestModule`] per name, defined in `Android.bp`
/// on consecutive lines.
pub fn graph_with(names: &[&str]) -> Graph {
  let mut graph = Graph::new();
  for (line, name) in names.iter().enumerate() {
    graph
      .add_module(
        Box::new(TestModule::new(name)),
        "test_module",
        Pos::new("Android.bp", line as u32 + 1, 1),
        "",
        BTreeMap::new(),
      )
      .unwrap();
  }
  graph
}

pub fn test_config() -> Config {
  Config::for_tests(MockFs::new())
}
