//! Build targets: the (OS, architecture) pairs module variants are split over.

pub mod arch;
pub mod os;

pub use arch::ArchType;
pub use os::{Os, OsClass};

use std::fmt;

use serde::Serialize;

/// One host or device target, e.g. `android_arm64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Target {
  pub os: Os,
  pub arch: ArchType,
}

impl Target {
  pub fn new(os: Os, arch: ArchType) -> Self {
    Self { os, arch }
  }

  /// The host target of the running machine, defaulting to linux x86_64
  pub fn host() -> Self {
    Self {
      os: Os::host().unwrap_or(Os::LinuxGlibc),
      arch: ArchType::host().unwrap_or(ArchType::X86_64),
    }
  }

  /// Variation name used by the `arch` mutator (e.g., "android_arm64")
  pub fn variation(&self) -> String {
    format!("{}_{}", self.os, self.arch)
  }

  pub fn class(&self) -> OsClass {
    self.os.class()
  }

  pub fn is_host(&self) -> bool {
    self.class() == OsClass::Host
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.variation())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn variation_format() {
    // Variation names are "os_arch"
    let target = Target::new(Os::Android, ArchType::Arm64);
    assert_eq!(target.variation(), "android_arm64");

    let target = Target::new(Os::LinuxGlibc, ArchType::X86_64);
    assert_eq!(target.variation(), "linux_glibc_x86_64");
    assert!(target.is_host());
  }
}
