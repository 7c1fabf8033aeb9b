//! Built-in module types.
//!
//! | type | variants | outputs |
//! |------|----------|---------|
//! | `filegroup` | none | its expanded `srcs` |
//! | `genrule` | device, host with `host_supported` | the files listed in `out` |
//! | `prebuilt_etc` | device, host with `host_supported` | `src`, installed under `etc/` |
//! | `phony` | none | nothing; names the install closure of `required` |
//!
//! `genrule_defaults` and `prebuilt_etc_defaults` carry defaults for the
//! corresponding types.

mod defaults;
mod filegroup;
mod genrule;
mod phony;
mod prebuilt_etc;

use std::sync::Arc;

use crate::module::{Module, ModuleFactory};
use crate::proptools::PropertyStruct;

pub use defaults::DefaultsModule;
pub use filegroup::{Filegroup, FilegroupProperties};
pub use genrule::{Genrule, GenruleProperties};
pub use phony::Phony;
pub use prebuilt_etc::{PrebuiltEtc, PrebuiltEtcProperties};

fn factory<M: Module>(make: fn() -> M) -> ModuleFactory {
  Arc::new(move || Box::new(make()) as Box<dyn Module>)
}

fn defaults_factory(props: fn() -> Vec<Box<dyn PropertyStruct>>) -> ModuleFactory {
  Arc::new(move || Box::new(DefaultsModule::new(props())) as Box<dyn Module>)
}

/// Every built-in module type with its factory.
pub fn builtin_module_types() -> Vec<(&'static str, ModuleFactory)> {
  vec![
    ("filegroup", factory(Filegroup::new)),
    ("genrule", factory(Genrule::new)),
    (
      "genrule_defaults",
      defaults_factory(|| vec![Box::new(GenruleProperties::default()) as Box<dyn PropertyStruct>]),
    ),
    ("phony", factory(Phony::new)),
    ("prebuilt_etc", factory(PrebuiltEtc::new)),
    (
      "prebuilt_etc_defaults",
      defaults_factory(|| vec![Box::new(PrebuiltEtcProperties::default()) as Box<dyn PropertyStruct>]),
    ),
  ]
}
