use std::fmt;

use serde::Serialize;

/// Operating systems a module variant can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Os {
  Android,
  LinuxGlibc,
  Darwin,
}

/// Whether an OS runs the build (host) or the product (device).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OsClass {
  Host,
  Device,
}

impl Os {
  /// Detect the host operating system at runtime
  pub fn host() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::LinuxGlibc),
      "macos" => Some(Self::Darwin),
      _ => None,
    }
  }

  /// Returns the lowercase identifier used in variation names and `target` overlays
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Android => "android",
      Self::LinuxGlibc => "linux_glibc",
      Self::Darwin => "darwin",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "android" => Some(Self::Android),
      "linux_glibc" => Some(Self::LinuxGlibc),
      "darwin" => Some(Self::Darwin),
      _ => None,
    }
  }

  pub fn class(&self) -> OsClass {
    match self {
      Self::Android => OsClass::Device,
      Self::LinuxGlibc | Self::Darwin => OsClass::Host,
    }
  }

  /// Is this a linux kernel, host or device
  pub fn is_linux(&self) -> bool {
    matches!(self, Self::Android | Self::LinuxGlibc)
  }

  /// Directory name of host install trees, e.g. `out/host/linux-x86`
  pub fn host_prebuilt_tag(&self) -> &'static str {
    match self {
      Self::Darwin => "darwin-x86",
      Self::LinuxGlibc | Self::Android => "linux-x86",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl OsClass {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Host => "host",
      Self::Device => "device",
    }
  }
}
