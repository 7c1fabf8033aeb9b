//! Run-wide configuration shared by every stage.
//!
//! A [`Config`] is built once by the entry point and handed around as
//! `Arc<Config>`. It owns the source-tree filesystem, the product variables
//! loaded from a `soong.variables`-style JSON file, the host and device
//! targets and a [`OnceTable`] for memoised lookups such as globs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::fs::{FileSystem, GlobResult, MockFs, OsFs};
use crate::once::{OnceKey, OnceTable};
use crate::platform::{ArchType, Os, Target};
use crate::proptools::property_name_for_field;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read product variables {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid product variables {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unknown architecture {0:?}")]
  UnknownArch(String),

  #[error("glob {pattern:?}: {message}")]
  Glob { pattern: String, message: String },
}

/// Product variables, keyed the way `soong.variables` spells them.
///
/// Well-known keys are exposed as typed fields; every key (including the
/// well-known ones) stays reachable through [`ProductVariables::get`] so that
/// `product_variables` overlays can test arbitrary flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductVariables {
  #[serde(rename = "DeviceName", default, skip_serializing_if = "Option::is_none")]
  pub device_name: Option<String>,

  #[serde(rename = "DeviceArch", default, skip_serializing_if = "Option::is_none")]
  pub device_arch: Option<String>,

  #[serde(rename = "DeviceSecondaryArch", default, skip_serializing_if = "Option::is_none")]
  pub device_secondary_arch: Option<String>,

  #[serde(rename = "Allow_missing_dependencies", default, skip_serializing_if = "Option::is_none")]
  pub allow_missing_dependencies: Option<bool>,

  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>,
}

/// The value of one product variable as seen by a `product_variables` overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
  Bool(bool),
  Int(i64),
  String(String),
}

impl VariableValue {
  /// Does the overlay for this variable apply
  pub fn is_set(&self) -> bool {
    match self {
      Self::Bool(b) => *b,
      Self::Int(_) => true,
      Self::String(s) => !s.is_empty(),
    }
  }

  /// Text substituted for `%s` / `%d` in overlay strings
  pub fn substitution(&self) -> Option<String> {
    match self {
      Self::Bool(_) => None,
      Self::Int(i) => Some(i.to_string()),
      Self::String(s) => Some(s.clone()),
    }
  }
}

impl ProductVariables {
  pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(json)
  }

  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_json(&data).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Look up a variable by its JSON key (`Debuggable`) or property name (`debuggable`).
  pub fn get(&self, name: &str) -> Option<VariableValue> {
    let wanted = property_name_for_field(name);
    let value = match wanted.as_str() {
      "device_name" => return self.device_name.clone().map(VariableValue::String),
      "device_arch" => return self.device_arch.clone().map(VariableValue::String),
      "device_secondary_arch" => return self.device_secondary_arch.clone().map(VariableValue::String),
      "allow_missing_dependencies" => return self.allow_missing_dependencies.map(VariableValue::Bool),
      _ => {
        self
          .extra
          .iter()
          .find(|(key, _)| property_name_for_field(key) == wanted)?
          .1
      }
    };
    match value {
      Value::Bool(b) => Some(VariableValue::Bool(*b)),
      Value::Number(n) => n.as_i64().map(VariableValue::Int),
      Value::String(s) => Some(VariableValue::String(s.clone())),
      _ => None,
    }
  }
}

/// Shared configuration for one run.
pub struct Config {
  pub src_dir: PathBuf,
  /// Output directory relative to the source root (usually `out`).
  pub out_dir: String,
  pub product_device: String,
  pub host_targets: Vec<Target>,
  pub device_targets: Vec<Target>,
  pub allow_missing_dependencies: bool,
  pub product_variables: ProductVariables,
  /// `SYSROOT` as it was set when the run started
  pub sysroot: Option<String>,
  fs: Arc<dyn FileSystem>,
  once: OnceTable,
}

impl fmt::Debug for Config {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Config")
      .field("src_dir", &self.src_dir)
      .field("out_dir", &self.out_dir)
      .field("product_device", &self.product_device)
      .field("host_targets", &self.host_targets)
      .field("device_targets", &self.device_targets)
      .field("allow_missing_dependencies", &self.allow_missing_dependencies)
      .finish_non_exhaustive()
  }
}

static GLOBS: OnceKey<Result<GlobResult, String>> = OnceKey::new("glob");

impl Config {
  /// A configuration reading the real tree under `src_dir`.
  pub fn new(src_dir: impl Into<PathBuf>, out_dir: impl Into<String>) -> Self {
    let src_dir = src_dir.into();
    let fs = Arc::new(OsFs::new(src_dir.clone()));
    Self::with_fs(src_dir, out_dir, fs)
  }

  pub fn with_fs(src_dir: impl Into<PathBuf>, out_dir: impl Into<String>, fs: Arc<dyn FileSystem>) -> Self {
    Self {
      src_dir: src_dir.into(),
      out_dir: out_dir.into(),
      product_device: "generic".to_string(),
      host_targets: vec![Target::host()],
      device_targets: vec![
        Target::new(Os::Android, ArchType::Arm64),
        Target::new(Os::Android, ArchType::Arm),
      ],
      allow_missing_dependencies: false,
      product_variables: ProductVariables::default(),
      sysroot: None,
      fs,
      once: OnceTable::new(),
    }
  }

  /// A configuration over an in-memory tree, with a fixed linux host.
  pub fn for_tests(fs: MockFs) -> Self {
    let mut config = Self::with_fs("", "out", Arc::new(fs));
    config.host_targets = vec![Target::new(Os::LinuxGlibc, ArchType::X86_64)];
    config
  }

  /// Apply product variables, deriving the device name and targets from them.
  pub fn apply_product_variables(&mut self, vars: ProductVariables) -> Result<(), ConfigError> {
    if let Some(device) = &vars.device_name {
      self.product_device = device.clone();
    }
    if let Some(arch) = &vars.device_arch {
      let primary = parse_arch(arch)?;
      let mut targets = vec![Target::new(Os::Android, primary)];
      if let Some(secondary) = vars.device_secondary_arch.as_deref().filter(|a| !a.is_empty()) {
        targets.push(Target::new(Os::Android, parse_arch(secondary)?));
      }
      self.device_targets = targets;
    }
    if let Some(allow) = vars.allow_missing_dependencies {
      self.allow_missing_dependencies = allow;
    }
    debug!(device = %self.product_device, targets = self.device_targets.len(), "applied product variables");
    self.product_variables = vars;
    Ok(())
  }

  pub fn fs(&self) -> &dyn FileSystem {
    self.fs.as_ref()
  }

  pub fn once_table(&self) -> &OnceTable {
    &self.once
  }

  /// Memoise `compute` for the rest of the run.
  pub fn once<T, F>(&self, key: &OnceKey<T>, compute: F) -> T
  where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> T,
  {
    self.once.once(key, compute)
  }

  /// Expand a glob relative to the source root, memoised per pattern and excludes.
  pub fn glob(&self, pattern: &str, excludes: &[String]) -> Result<GlobResult, ConfigError> {
    let sub = format!("{pattern}\0{}", excludes.join("\0"));
    self
      .once
      .once_keyed(&GLOBS, &sub, || self.fs.glob(pattern, excludes).map_err(|e| e.to_string()))
      .map_err(|message| ConfigError::Glob {
        pattern: pattern.to_string(),
        message,
      })
  }

  /// Intermediates live under `<out>/soong/.intermediates`
  pub fn intermediates_dir(&self) -> String {
    format!("{}/soong/.intermediates", self.out_dir)
  }

  pub fn product_out(&self) -> String {
    format!("{}/target/product/{}", self.out_dir, self.product_device)
  }

  pub fn host_out(&self, os: Os) -> String {
    format!("{}/host/{}", self.out_dir, os.host_prebuilt_tag())
  }

  /// The first host target, used for tools
  pub fn build_os_target(&self) -> Target {
    self.host_targets.first().copied().unwrap_or_else(Target::host)
  }
}

fn parse_arch(name: &str) -> Result<ArchType, ConfigError> {
  ArchType::from_name(name).ok_or_else(|| ConfigError::UnknownArch(name.to_string()))
}
