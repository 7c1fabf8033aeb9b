//! Shared helpers for pipeline tests.

use blueprint_lib::fs::MockFs;
use blueprint_lib::{BlueprintError, Config, Context, RunOutput};

/// An in-memory source tree and the build files to read from it.
#[derive(Default)]
pub struct Tree {
  fs: MockFs,
  build_files: Vec<String>,
}

impl Tree {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a build file.
  pub fn bp(mut self, path: &str, src: &str) -> Self {
    self.fs.add_file(path, src);
    self.build_files.push(path.to_string());
    self
  }

  /// Add empty source files.
  pub fn files(mut self, paths: &[&str]) -> Self {
    for path in paths {
      self.fs.add_file(*path, "");
    }
    self
  }

  pub fn run(self) -> Result<RunOutput, BlueprintError> {
    self.run_with(|_| {})
  }

  pub fn run_with(self, configure: impl FnOnce(&mut Config)) -> Result<RunOutput, BlueprintError> {
    let mut config = Config::for_tests(self.fs);
    configure(&mut config);
    Context::new().run(&config, &self.build_files)
  }
}

/// The manifest with wrapped `build` lines joined back together.
pub fn unwrapped(manifest: &str) -> String {
  manifest.replace(" $\n    ", " ")
}

/// Every line of the manifest starting with `prefix`, after unwrapping.
pub fn lines_starting(manifest: &str, prefix: &str) -> Vec<String> {
  unwrapped(manifest)
    .lines()
    .filter(|l| l.starts_with(prefix))
    .map(str::to_string)
    .collect()
}

pub const ETC: &str = "out/target/product/generic/system/etc";
