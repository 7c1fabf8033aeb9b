use std::fmt;

use serde::Serialize;

/// CPU architectures a module variant can be compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchType {
  Arm,
  Arm64,
  X86,
  X86_64,
  Riscv64,
}

impl ArchType {
  pub const ALL: [ArchType; 5] = [Self::Arm, Self::Arm64, Self::X86, Self::X86_64, Self::Riscv64];

  /// Detect the host CPU architecture at runtime
  pub fn host() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Arm64),
      _ => None,
    }
  }

  /// Returns the lowercase identifier used in `arch` overlays
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Arm => "arm",
      Self::Arm64 => "arm64",
      Self::X86 => "x86",
      Self::X86_64 => "x86_64",
      Self::Riscv64 => "riscv64",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|a| a.as_str() == name)
  }

  pub fn is_64bit(&self) -> bool {
    matches!(self, Self::Arm64 | Self::X86_64 | Self::Riscv64)
  }

  /// `lib32` or `lib64`, the key of `multilib` overlays
  pub fn multilib(&self) -> &'static str {
    if self.is_64bit() { "lib64" } else { "lib32" }
  }
}

impl fmt::Display for ArchType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn multilib_follows_word_size() {
    assert_eq!(ArchType::Arm.multilib(), "lib32");
    assert_eq!(ArchType::X86.multilib(), "lib32");
    assert_eq!(ArchType::Arm64.multilib(), "lib64");
    assert_eq!(ArchType::Riscv64.multilib(), "lib64");
  }

  #[test]
  fn lookup_by_name() {
    assert_eq!(ArchType::from_name("x86_64"), Some(ArchType::X86_64));
    assert_eq!(ArchType::from_name("mips"), None);
  }
}
