//! Action assembly.
//!
//! Each enabled module variant declares its build actions through a
//! [`ModuleContext`]: rules and variables scoped to a [`PackageContext`] or to
//! the module itself, build statements described by [`BuildParams`], phony
//! targets and installed files. Singletons then add actions that need a view
//! of every module. The result is handed to the manifest writer.
//!
//! # Submodules
//!
//! - [`pctx`] - package contexts and global names
//! - [`depset`] - ordered sets with structural sharing
//! - [`install`] - install paths, packaging specs and the built-in copy rules

mod actions;
mod context;
pub mod depset;
pub(crate) mod generate;
pub mod install;
mod ninja_string;
mod params;
pub mod pctx;
mod singleton;

pub use context::{ModuleContext, parse_module_reference};
pub use depset::{DepSet, DepSetOrder};
pub use install::{INSTALL_INFO, InstallInfo, OUTPUT_FILES, OutputFiles, PackagingSpec};
pub use ninja_string::{NinjaString, NinjaStringError, VarRef};
pub use params::{BuildParams, DepsFormat, Pool, Rule, RuleParams};
pub use pctx::PackageContext;
pub use singleton::{BuildTargetsSingleton, Singleton, SingletonContext, SingletonFactory};

pub(crate) use actions::{BuildDef, ModuleActions, ResolvedRule};
pub(crate) use context::GeneratedActions;
pub(crate) use pctx::{global_name, sanitize};
pub(crate) use singleton::{SingletonOutput, check_singleton_outputs};
