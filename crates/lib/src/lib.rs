//! blueprint-lib: a declarative build orchestrator
//!
//! Build files declare modules; the library turns them into a Ninja
//! manifest:
//! - `parser`, `proptools`: build-file syntax and the property engine that
//!   unpacks it into typed property structs
//! - `graph`, `mutators`: the module graph, its variants and the mutator
//!   pipeline that shapes it
//! - `build`, `modules`: module types and the actions they declare
//! - `ninja`: the manifest and its dep file
//! - `context`: the registries and the run itself

pub mod build;
pub mod config;
pub mod consts;
pub mod context;
pub mod error;
pub mod fs;
pub mod graph;
pub mod module;
pub mod modules;
pub mod mutators;
pub mod ninja;
pub mod once;
pub mod parser;
pub mod platform;
pub mod proptools;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::Config;
pub use context::{Context, RunOutput, StageTiming, parse_file_list, take_sysroot};
pub use error::{BlueprintError, Diagnostic};
