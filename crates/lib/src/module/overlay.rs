//! `arch`, `multilib`, `target` and `product_variables` blocks.
//!
//! These blocks are split off a module definition before unpacking. Each
//! `axis: { key: { ... } }` entry becomes an [`Overlay`]: a property list that
//! is validated against the module's property roots when the module is
//! created and merged onto them (append order) by the `arch_props` and
//! `product_variables` mutators once the overlay is known to apply.

use std::fmt;

use crate::parser::{Expression, Pos, Property};
use crate::proptools::{
  ExtendOptions, FieldMut, Order, PropertyError, PropertyStruct, Tags, UnpackOptions, Unpacker, extend_properties,
  walk_fields_mut,
};
use crate::platform::{ArchType, Os};

use super::Module;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayAxis {
  Arch,
  Multilib,
  Target,
  ProductVariables,
}

impl OverlayAxis {
  pub const ALL: [OverlayAxis; 4] = [Self::Arch, Self::Multilib, Self::Target, Self::ProductVariables];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Arch => "arch",
      Self::Multilib => "multilib",
      Self::Target => "target",
      Self::ProductVariables => "product_variables",
    }
  }

  fn from_property(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|a| a.as_str() == name)
  }

  fn accepts(&self, key: &str) -> bool {
    match self {
      Self::Arch => ArchType::from_name(key).is_some(),
      Self::Multilib => matches!(key, "lib32" | "lib64"),
      Self::Target => Os::from_name(key).is_some() || matches!(key, "host" | "linux"),
      Self::ProductVariables => true,
    }
  }

  /// Fields an overlay on this axis may set.
  fn options(&self) -> UnpackOptions {
    match self {
      Self::ProductVariables => UnpackOptions::default(),
      _ => UnpackOptions::only_tagged(Tags::ARCH_VARIANT),
    }
  }
}

impl fmt::Display for OverlayAxis {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone)]
pub struct Overlay {
  pub axis: OverlayAxis,
  pub key: String,
  pub properties: Vec<Property>,
  pub pos: Pos,
}

impl Overlay {
  /// Property path prefix, e.g. `arch.arm64`.
  pub fn path(&self) -> String {
    format!("{}.{}", self.axis, self.key)
  }

  /// Unpack this overlay into zeroed copies of `roots`.
  fn unpack(&self, roots: &[&dyn PropertyStruct]) -> Result<Vec<Box<dyn PropertyStruct>>, Vec<PropertyError>> {
    let mut zeroed: Vec<Box<dyn PropertyStruct>> = roots.iter().map(|r| r.zeroed()).collect();
    let mut unpacker = Unpacker::with_prefix(&self.properties, &self.path(), self.axis.options());
    for root in zeroed.iter_mut() {
      unpacker.unpack(root.as_mut());
    }
    unpacker.finish()?;
    Ok(zeroed)
  }
}

/// Split overlay blocks off a module definition's properties.
///
/// Returns the remaining properties and the overlays in source order.
pub fn split_overlays(properties: &[Property]) -> (Vec<Property>, Vec<Overlay>, Vec<PropertyError>) {
  let mut rest = Vec::new();
  let mut overlays = Vec::new();
  let mut errors = Vec::new();

  for prop in properties {
    let Some(axis) = OverlayAxis::from_property(&prop.name) else {
      rest.push(prop.clone());
      continue;
    };
    let Expression::Map(map) = prop.value.eval() else {
      errors.push(map_expected(&prop.name, &prop.value));
      continue;
    };
    for entry in &map.properties {
      let path = format!("{}.{}", axis, entry.name);
      if !axis.accepts(&entry.name) {
        errors.push(PropertyError::invalid(
          &entry.colon_pos,
          &path,
          format!("unrecognized property {:?}", path),
        ));
        continue;
      }
      let Expression::Map(inner) = entry.value.eval() else {
        errors.push(map_expected(&path, &entry.value));
        continue;
      };
      overlays.push(Overlay {
        axis,
        key: entry.name.clone(),
        properties: inner.properties.clone(),
        pos: entry.colon_pos.clone(),
      });
    }
  }
  (rest, overlays, errors)
}

fn map_expected(name: &str, value: &Expression) -> PropertyError {
  PropertyError::invalid(
    value.pos(),
    name,
    format!("can't assign {} value to map property {:?}", value.eval().value_type(), name),
  )
}

/// Check every overlay of `module` against its property roots.
pub fn validate_overlays(module: &dyn Module) -> Vec<PropertyError> {
  let roots = module.property_roots();
  let mut errors = Vec::new();
  for overlay in module.base().overlays() {
    if let Err(errs) = overlay.unpack(&roots) {
      errors.extend(errs);
    }
  }
  errors
}

/// Merge `overlay` onto `module`'s property roots.
///
/// `substitution` replaces `%s` and `%d` in every string the overlay sets.
pub fn apply_overlay(module: &mut dyn Module, overlay: &Overlay, substitution: Option<&str>) -> Result<(), Vec<PropertyError>> {
  let mut values = overlay.unpack(&module.property_roots())?;
  if let Some(value) = substitution {
    for root in values.iter_mut() {
      substitute(root.as_mut(), value);
    }
  }
  let mut errors = Vec::new();
  for (root, value) in module.property_roots_mut().into_iter().zip(values.iter()) {
    if let Err(err) = extend_properties(root, value.as_ref(), ExtendOptions::new(Order::Append)) {
      errors.push(err);
    }
  }
  if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn substitute(props: &mut dyn PropertyStruct, value: &str) {
  let replace = |s: &mut String| {
    if s.contains("%s") || s.contains("%d") {
      *s = s.replace("%s", value).replace("%d", value);
    }
  };
  walk_fields_mut(props, &mut |_, _, field| match field {
    FieldMut::String(s) => replace(s),
    FieldMut::OptionalString(Some(s)) => replace(s),
    FieldMut::StringList(list) => list.iter_mut().for_each(replace),
    _ => {}
  });
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;

  fn props(src: &str) -> Vec<Property> {
    parse("Android.bp", src).unwrap().modules().next().unwrap().properties().to_vec()
  }

  #[test]
  fn splits_overlays_in_source_order() {
    let (rest, overlays, errors) = split_overlays(&props(
      r#"m {
        name: "x",
        arch: { arm: { srcs: ["a.c"] }, x86_64: { srcs: ["b.c"] } },
        target: { host: { enabled: false } },
        product_variables: { debuggable: { cflags: ["-g"] } },
      }"#,
    ));
    assert!(errors.is_empty());
    assert_eq!(rest.len(), 1);
    let paths: Vec<_> = overlays.iter().map(Overlay::path).collect();
    assert_eq!(
      paths,
      vec!["arch.arm", "arch.x86_64", "target.host", "product_variables.debuggable"]
    );
  }

  #[test]
  fn unknown_keys_and_shapes() {
    let (_, overlays, errors) = split_overlays(&props(
      r#"m {
        arch: { mips: { srcs: [] }, arm: ["x"] },
        multilib: "lib32",
      }"#,
    ));
    assert!(overlays.is_empty());
    let messages: Vec<_> = errors.iter().map(|e| e.message().to_string()).collect();
    assert_eq!(
      messages,
      vec![
        r#"unrecognized property "arch.mips""#,
        r#"can't assign list value to map property "arch.arm""#,
        r#"can't assign string value to map property "multilib""#,
      ]
    );
  }

  #[test]
  fn substitution_rewrites_strings() {
    crate::property_struct! {
      struct Flags {
        cflags: Vec<String>,
        version: Option<String>,
      }
    }
    let mut flags = Flags {
      cflags: vec!["-DSDK=%d".to_string(), "-O2".to_string()],
      version: Some("v%s".to_string()),
    };
    substitute(&mut flags, "34");
    assert_eq!(flags.cflags, vec!["-DSDK=34", "-O2"]);
    assert_eq!(flags.version.as_deref(), Some("v34"));
  }
}
