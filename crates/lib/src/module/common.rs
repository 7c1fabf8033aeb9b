//! Properties every module type accepts.

use std::fmt;

use crate::property_struct;

property_struct! {
  /// Properties shared by all module types, unpacked ahead of the
  /// type-specific roots.
  pub struct CommonProperties {
    pub name: String,

    /// Set to false to skip generating build actions for this module.
    pub enabled: Option<bool> => [arch_variant],

    /// Names of defaults modules whose properties are prepended to this module's.
    pub defaults: Vec<String>,

    /// Modules that must be installed alongside this one.
    pub required: Vec<String> => [arch_variant],

    pub host_supported: Option<bool>,
    pub device_supported: Option<bool>,

    /// `first`, `both`, `32` or `64`
    pub compile_multilib: Option<String>,

    pub vendor: Option<bool>,
    pub soc_specific: Option<bool>,
    pub device_specific: Option<bool>,
    pub product_specific: Option<bool>,
    pub system_ext_specific: Option<bool>,

    pub visibility: Vec<String>,

    pub compile_os: String => [mutated],
    pub compile_arch: String => [mutated],
    pub skip_install: bool => [mutated],
  }
}

impl CommonProperties {
  pub fn enabled(&self) -> bool {
    self.enabled.unwrap_or(true)
  }

  /// The install partition selected by the specificity flags.
  ///
  /// At most one of `vendor`/`soc_specific`, `device_specific`,
  /// `product_specific` and `system_ext_specific` may be set.
  pub fn partition(&self) -> Result<Partition, String> {
    let flags = [
      ("vendor", self.vendor, Partition::Vendor),
      ("soc_specific", self.soc_specific, Partition::Vendor),
      ("device_specific", self.device_specific, Partition::Odm),
      ("product_specific", self.product_specific, Partition::Product),
      ("system_ext_specific", self.system_ext_specific, Partition::SystemExt),
    ];
    let set: Vec<_> = flags.iter().filter(|(_, v, _)| *v == Some(true)).collect();
    let Some((first, _, partition)) = set.first() else {
      return Ok(Partition::System);
    };
    if let Some((second, _, _)) = set.iter().skip(1).find(|(_, _, p)| p != partition) {
      return Err(format!("\"{}: true\" and \"{}: true\" may not be used together", first, second));
    }
    Ok(*partition)
  }
}

/// Image partition a device module installs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Partition {
  #[default]
  System,
  Vendor,
  Odm,
  Product,
  SystemExt,
}

impl Partition {
  pub fn dir(&self) -> &'static str {
    match self {
      Self::System => "system",
      Self::Vendor => "vendor",
      Self::Odm => "odm",
      Self::Product => "product",
      Self::SystemExt => "system_ext",
    }
  }
}

impl fmt::Display for Partition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.dir())
  }
}

/// Check a module name: non-empty, no path separators or whitespace.
pub fn validate_name(name: &str) -> Result<(), String> {
  if name.is_empty() {
    return Err("name must not be empty".to_string());
  }
  if let Some(c) = name.chars().find(|c| c.is_whitespace() || matches!(c, '/' | ':' | '$' | '"' | '{' | '}')) {
    return Err(format!("name {:?} contains invalid character {:?}", name, c));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partition_defaults_to_system() {
    assert_eq!(CommonProperties::default().partition(), Ok(Partition::System));
  }

  #[test]
  fn vendor_aliases_agree() {
    let props = CommonProperties {
      vendor: Some(true),
      soc_specific: Some(true),
      ..Default::default()
    };
    assert_eq!(props.partition(), Ok(Partition::Vendor));
  }

  #[test]
  fn conflicting_specificity() {
    let props = CommonProperties {
      product_specific: Some(true),
      system_ext_specific: Some(true),
      ..Default::default()
    };
    assert_eq!(
      props.partition().unwrap_err(),
      r#""product_specific: true" and "system_ext_specific: true" may not be used together"#
    );

    let props = CommonProperties {
      device_specific: Some(true),
      product_specific: Some(false),
      ..Default::default()
    };
    assert_eq!(props.partition(), Ok(Partition::Odm));
  }

  #[test]
  fn names() {
    assert!(validate_name("libfoo-1.0_x").is_ok());
    assert!(validate_name("").is_err());
    assert_eq!(
      validate_name("a/b").unwrap_err(),
      r#"name "a/b" contains invalid character '/'"#
    );
  }
}
