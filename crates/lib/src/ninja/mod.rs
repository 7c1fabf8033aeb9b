//! Manifest emission: the build runner's manifest and the dep file that
//! makes the runner regenerate it when a build file changes.

mod depfile;
mod manifest;
mod writer;

pub use depfile::{render_depfile, write_depfile};

pub(crate) use manifest::{ManifestInput, write_manifest};
