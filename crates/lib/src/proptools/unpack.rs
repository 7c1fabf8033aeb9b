//! Binding parsed properties onto property structs.
//!
//! An [`Unpacker`] first flattens the parsed properties into a map keyed by
//! property path (`name`, `parent.child`, `list[0].child`), each entry with a
//! used flag. Every call to [`Unpacker::unpack`] walks one property struct's
//! descriptor table, consuming matching entries. [`Unpacker::finish`] reports
//! whatever is left over as unrecognized.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::names::base_property_name;
use super::schema::{Field, FieldKind, FieldMut, PropertyStruct, Tags};
use super::PropertyError;
use crate::consts::{MAP_PROPERTY_ALLOWLIST, MAX_ERRORS};
use crate::parser::{Expression, Property};

/// Knobs for an unpack pass.
#[derive(Debug, Clone)]
pub struct UnpackOptions {
  /// When non-empty, only fields carrying these tags (or structs containing
  /// such fields) accept values.
  pub only_tagged: Tags,
  /// Map-valued properties that may be set from a build file.
  pub map_allowlist: Vec<String>,
}

impl Default for UnpackOptions {
  fn default() -> Self {
    Self {
      only_tagged: Tags::NONE,
      map_allowlist: MAP_PROPERTY_ALLOWLIST.iter().map(|s| s.to_string()).collect(),
    }
  }
}

impl UnpackOptions {
  pub fn only_tagged(tags: Tags) -> Self {
    Self {
      only_tagged: tags,
      ..Self::default()
    }
  }
}

struct Packed {
  property: Arc<Property>,
  used: bool,
}

pub struct Unpacker {
  props: BTreeMap<String, Packed>,
  errors: Vec<PropertyError>,
  options: UnpackOptions,
  prefix: String,
}

impl Unpacker {
  pub fn new(properties: &[Property], options: UnpackOptions) -> Self {
    Self::with_prefix(properties, "", options)
  }

  /// An unpacker for properties nested under `prefix` (e.g. `arch.arm`), so
  /// that diagnostics name the full property path.
  pub fn with_prefix(properties: &[Property], prefix: &str, options: UnpackOptions) -> Self {
    let prefix = if prefix.is_empty() {
      String::new()
    } else {
      format!("{}.", prefix.trim_end_matches('.'))
    };
    let mut unpacker = Self {
      props: BTreeMap::new(),
      errors: Vec::new(),
      options,
      prefix: prefix.clone(),
    };
    unpacker.add_properties(&prefix, properties);
    unpacker
  }

  fn add_properties(&mut self, prefix: &str, properties: &[Property]) {
    for prop in properties {
      let name = format!("{}{}", prefix, prop.name);
      if self.props.contains_key(&name) {
        self.error(PropertyError::invalid(
          &prop.colon_pos,
          &name,
          format!("property {:?} already defined", name),
        ));
        continue;
      }
      self.props.insert(
        name.clone(),
        Packed {
          property: Arc::new(prop.clone()),
          used: false,
        },
      );

      match prop.value.eval() {
        Expression::Map(map) => self.add_properties(&format!("{}.", name), &map.properties),
        Expression::List(list) => {
          for (i, value) in list.values.iter().enumerate() {
            let Expression::Map(map) = value.eval() else {
              continue;
            };
            let item = format!("{}[{}]", name, i);
            let mut synthetic = Property::new(item.clone(), value.clone());
            synthetic.colon_pos = map.lbrace.clone();
            self.props.insert(
              item.clone(),
              Packed {
                property: Arc::new(synthetic),
                used: false,
              },
            );
            self.add_properties(&format!("{}.", item), &map.properties);
          }
        }
        _ => {}
      }
    }
  }

  fn error(&mut self, err: PropertyError) {
    if self.errors.len() < MAX_ERRORS {
      self.errors.push(err);
    }
  }

  fn full(&self) -> bool {
    self.errors.len() >= MAX_ERRORS
  }

  pub fn has_errors(&self) -> bool {
    !self.errors.is_empty()
  }

  /// Populate `target` from the properties. May be called for several
  /// property structs in turn; a property counts as used once any of them
  /// consumes it.
  pub fn unpack(&mut self, target: &mut dyn PropertyStruct) {
    let filter = self.options.only_tagged;
    let prefix = self.prefix.clone();
    self.unpack_struct(&prefix, target, filter);
  }

  fn unpack_struct(&mut self, prefix: &str, target: &mut dyn PropertyStruct, filter: Tags) {
    let fields = target.fields();
    for (field, value) in fields.iter().zip(target.field_muts()) {
      if self.full() {
        return;
      }
      if field.is_embedded() {
        if let FieldMut::Struct(inner) = value {
          self.unpack_struct(prefix, inner, filter);
        }
        continue;
      }

      let tagged = field.tags.contains(filter);
      if !tagged && !field.kind.is_struct() {
        continue;
      }
      let child_filter = if tagged { Tags::NONE } else { filter };

      let name = format!("{}{}", prefix, field.property_name());
      if let FieldMut::Dynamic(d) = &value
        && d.get().is_none()
      {
        continue;
      }
      let Some(packed) = self.props.get_mut(&name) else {
        continue;
      };
      packed.used = true;
      let prop = packed.property.clone();

      if field.is_mutated() {
        self.error(PropertyError::invalid(
          &prop.colon_pos,
          &name,
          format!("mutated field {} cannot be set in a Blueprint file", name),
        ));
        continue;
      }

      self.unpack_field(&name, field, value, &prop, child_filter);
    }
  }

  fn unpack_field(&mut self, name: &str, field: &Field, value: FieldMut<'_>, prop: &Property, filter: Tags) {
    let v = prop.value.eval();
    let pos = prop.value.pos();
    match (value, v) {
      (FieldMut::Bool(dst), Expression::Bool { value, .. }) => *dst = *value,
      (FieldMut::OptionalBool(dst), Expression::Bool { value, .. }) => *dst = Some(*value),
      (FieldMut::Int64(dst), Expression::Int64 { value, .. }) => *dst = *value,
      (FieldMut::OptionalInt64(dst), Expression::Int64 { value, .. }) => *dst = Some(*value),
      (FieldMut::String(dst), Expression::String { value, .. }) => *dst = value.clone(),
      (FieldMut::OptionalString(dst), Expression::String { value, .. }) => *dst = Some(value.clone()),
      (FieldMut::StringList(dst), Expression::List(list)) => {
        *dst = self.strings(name, &list.values);
      }
      (FieldMut::StringSet(dst), Expression::List(list)) => {
        *dst = self.strings(name, &list.values).into_iter().collect();
      }
      (FieldMut::StringMap(dst), Expression::Map(map)) => {
        self.mark_children_used(name);
        let allowed = field.is_mutated()
          || self
            .options
            .map_allowlist
            .iter()
            .any(|a| a == name || a == base_property_name(name));
        if !allowed {
          self.error(PropertyError::invalid(
            &prop.colon_pos,
            name,
            format!(
              "Uses of maps for properties must be allowlisted. {:?} is an unsupported use case",
              name
            ),
          ));
          return;
        }
        for (i, entry) in map.properties.iter().enumerate() {
          match entry.value.eval() {
            Expression::String { value, .. } => {
              dst.insert(entry.name.clone(), value.clone());
            }
            other => {
              let entry_name = format!("{}{{value:{}}}", name, i);
              self.type_error(&entry_name, "string", other, entry.value.pos());
            }
          }
        }
      }
      (FieldMut::Struct(inner), Expression::Map(_)) => {
        self.unpack_struct(&format!("{}.", name), inner, filter);
      }
      (FieldMut::OptionalStruct(opt), Expression::Map(_)) => {
        self.unpack_struct(&format!("{}.", name), opt.get_or_insert(), filter);
      }
      (FieldMut::Dynamic(d), Expression::Map(_)) => {
        if let Some(inner) = d.get_mut() {
          self.unpack_struct(&format!("{}.", name), inner, filter);
        }
      }
      (FieldMut::StructList(list), Expression::List(values)) => {
        for (i, elem) in values.values.iter().enumerate() {
          let item = format!("{}[{}]", name, i);
          match elem.eval() {
            Expression::Map(_) => {
              if let Some(packed) = self.props.get_mut(&item) {
                packed.used = true;
              }
              let dst = list.push_default();
              self.unpack_struct(&format!("{}.", item), dst, filter);
            }
            other => self.type_error(&item, "map", other, elem.pos()),
          }
        }
      }
      (_, other) => {
        if field.kind == FieldKind::StringMap {
          self.mark_children_used(name);
        }
        self.type_error(name, field.kind.expected(), other, pos);
      }
    }
  }

  fn strings(&mut self, name: &str, values: &[Expression]) -> Vec<String> {
    let mut out = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
      match value.eval() {
        Expression::String { value: s, .. } => out.push(s.clone()),
        other => self.type_error(&format!("{}[{}]", name, i), "string", other, value.pos()),
      }
    }
    out
  }

  fn type_error(&mut self, name: &str, expected: &str, found: &Expression, pos: &crate::parser::Pos) {
    self.error(PropertyError::invalid(
      pos,
      name,
      format!(
        "can't assign {} value to {} property {:?}",
        found.value_type(),
        expected,
        name
      ),
    ));
  }

  fn mark_children_used(&mut self, name: &str) {
    let prefix = format!("{}.", name);
    for (_, packed) in self.props.range_mut(prefix.clone()..).take_while(|(k, _)| k.starts_with(&prefix)) {
      packed.used = true;
    }
  }

  /// Report unused properties and return the property map.
  ///
  /// Unused properties are reported sorted by path. Once `a` is reported,
  /// `a.x` and `a[0]` are suppressed.
  pub fn finish(mut self) -> Result<BTreeMap<String, Arc<Property>>, Vec<PropertyError>> {
    let mut reported: Vec<&str> = Vec::new();
    let mut unrecognized = Vec::new();
    for (name, packed) in &self.props {
      if packed.used {
        continue;
      }
      let suppressed = reported.iter().any(|prefix| {
        name.starts_with(prefix) && matches!(name.as_bytes().get(prefix.len()), Some(b'.') | Some(b'['))
      });
      if suppressed {
        continue;
      }
      reported.push(name);
      unrecognized.push(PropertyError::invalid(
        &packed.property.colon_pos,
        name,
        format!("unrecognized property {:?}", name),
      ));
    }
    for err in unrecognized {
      self.error(err);
    }

    if self.errors.is_empty() {
      Ok(self.props.into_iter().map(|(k, v)| (k, v.property)).collect())
    } else {
      Err(self.errors)
    }
  }
}

/// Unpack `properties` onto every struct in `targets` with default options.
pub fn unpack_properties(
  properties: &[Property],
  targets: &mut [&mut dyn PropertyStruct],
) -> Result<BTreeMap<String, Arc<Property>>, Vec<PropertyError>> {
  let mut unpacker = Unpacker::new(properties, UnpackOptions::default());
  for target in targets.iter_mut() {
    unpacker.unpack(&mut **target);
  }
  unpacker.finish()
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;
  use crate::parser::{ModuleDef, parse};
  use crate::proptools::DynProperties;

  crate::property_struct! {
    struct Simple {
      a: String,
    }
  }

  crate::property_struct! {
    struct Nested {
      cflags: Vec<String> => [arch_variant],
      enabled: Option<bool>,
    }
  }

  crate::property_struct! {
    struct Props {
      name: String,
      count: i64,
      srcs: Vec<String> => [arch_variant],
      tags: std::collections::BTreeSet<String>,
      m: BTreeMap<String, String>,
      env: BTreeMap<String, String>,
      compile_os: String => [mutated],
      nested: Nested,
      opt: Option<Box<Nested>>,
      items: Vec<Nested>,
      dynamic: DynProperties,
    }
  }

  fn module(src: &str) -> ModuleDef {
    parse("Android.bp", src).unwrap().modules().next().unwrap().clone()
  }

  fn messages(errs: &[PropertyError]) -> Vec<String> {
    errs.iter().map(|e| e.message().to_string()).collect()
  }

  #[test]
  fn unknown_property_is_reported_at_colon() {
    let def = module(r#"m { a: "x", b: "y" }"#);
    let mut simple = Simple::default();
    let errs = unpack_properties(def.properties(), &mut [&mut simple]).unwrap_err();

    assert_eq!(simple.a, "x");
    assert_eq!(messages(&errs), vec![r#"unrecognized property "b""#]);
    let PropertyError::Invalid { pos, .. } = &errs[0] else {
      panic!("unexpected error kind");
    };
    assert_eq!((pos.line, pos.column), (1, 14));
  }

  #[test]
  fn maps_require_allowlisting() {
    let def = module(r#"m { m: { k: "v" }, env: { A: "1", B: "2" } }"#);
    let mut props = Props::default();
    let errs = unpack_properties(def.properties(), &mut [&mut props]).unwrap_err();

    assert_eq!(
      messages(&errs),
      vec![r#"Uses of maps for properties must be allowlisted. "m" is an unsupported use case"#]
    );
    assert_eq!(props.env.get("B").map(String::as_str), Some("2"));
  }

  #[test]
  fn unpacks_nested_values() {
    let def = module(
      r#"m {
        name: "x",
        count: 4,
        srcs: ["a.c", "b.c"],
        tags: ["z", "y", "z"],
        nested: { cflags: ["-O2"], enabled: false },
        opt: { enabled: true },
        items: [{ cflags: ["-a"] }, { cflags: ["-b"] }],
      }"#,
    );
    let mut props = Props::default();
    let map = unpack_properties(def.properties(), &mut [&mut props]).unwrap();

    assert_eq!(props.count, 4);
    assert_eq!(props.srcs, vec!["a.c", "b.c"]);
    assert_eq!(props.tags.len(), 2);
    assert_eq!(props.nested.cflags, vec!["-O2"]);
    assert_eq!(props.nested.enabled, Some(false));
    assert_eq!(props.opt.as_ref().unwrap().enabled, Some(true));
    assert_eq!(props.items.len(), 2);
    assert_eq!(props.items[1].cflags, vec!["-b"]);
    assert!(map.contains_key("items[1].cflags"));
    assert!(map.contains_key("nested.enabled"));
  }

  #[test]
  fn optional_structs_stay_empty_when_unset() {
    let def = module(r#"m { name: "x" }"#);
    let mut props = Props::default();
    unpack_properties(def.properties(), &mut [&mut props]).unwrap();
    assert!(props.opt.is_none());
  }

  #[test]
  fn type_mismatch_is_reported_at_value() {
    let def = module("m {\n  srcs: \"a.c\",\n  count: [1],\n  nested: { enabled: \"yes\" },\n}");
    let mut props = Props::default();
    let errs = unpack_properties(def.properties(), &mut [&mut props]).unwrap_err();
    assert_eq!(
      messages(&errs),
      vec![
        r#"can't assign list value to int64 property "count""#,
        r#"can't assign string value to list property "srcs""#,
        r#"can't assign string value to bool property "nested.enabled""#,
      ]
    );
    let PropertyError::Invalid { pos, .. } = &errs[1] else {
      panic!("unexpected error kind");
    };
    assert_eq!((pos.line, pos.column), (2, 9));
  }

  #[test]
  fn mutated_fields_are_rejected() {
    let def = module(r#"m { compile_os: "linux" }"#);
    let mut props = Props::default();
    let errs = unpack_properties(def.properties(), &mut [&mut props]).unwrap_err();
    assert_eq!(
      messages(&errs),
      vec!["mutated field compile_os cannot be set in a Blueprint file"]
    );
    assert!(props.compile_os.is_empty());
  }

  #[test]
  fn duplicate_properties() {
    let def = module(r#"m { name: "a", name: "b" }"#);
    let mut props = Props::default();
    let errs = unpack_properties(def.properties(), &mut [&mut props]).unwrap_err();
    assert_eq!(messages(&errs), vec![r#"property "name" already defined"#]);
  }

  #[test]
  fn children_of_unrecognized_properties_are_suppressed() {
    let def = module(r#"m { pkg: { flags: ["-x"], other: "y" }, pkgs: [{ a: "b" }], nested: { bogus: true } }"#);
    let mut props = Props::default();
    let errs = unpack_properties(def.properties(), &mut [&mut props]).unwrap_err();
    assert_eq!(
      messages(&errs),
      vec![
        r#"unrecognized property "nested.bogus""#,
        r#"unrecognized property "pkg""#,
        r#"unrecognized property "pkgs""#,
      ]
    );
  }

  #[test]
  fn several_targets_share_one_property_map() {
    let def = module(r#"m { a: "x", name: "n" }"#);
    let mut simple = Simple::default();
    let mut props = Props::default();
    unpack_properties(def.properties(), &mut [&mut simple, &mut props]).unwrap();
    assert_eq!(simple.a, "x");
    assert_eq!(props.name, "n");
  }

  #[test]
  fn only_tagged_fields_accept_values() {
    let def = module(r#"m { srcs: ["a"], nested: { cflags: ["-g"], enabled: true }, name: "x" }"#);
    let mut props = Props::default();
    let mut unpacker = Unpacker::new(def.properties(), UnpackOptions::only_tagged(Tags::ARCH_VARIANT));
    unpacker.unpack(&mut props);
    let errs = unpacker.finish().unwrap_err();

    assert_eq!(props.srcs, vec!["a"]);
    assert_eq!(props.nested.cflags, vec!["-g"]);
    assert_eq!(
      messages(&errs),
      vec![
        r#"unrecognized property "name""#,
        r#"unrecognized property "nested.enabled""#,
      ]
    );
  }

  #[test]
  fn dynamic_fields() {
    let def = module(r#"m { dynamic: { enabled: true } }"#);

    let mut empty = Props::default();
    let errs = unpack_properties(def.properties(), &mut [&mut empty]).unwrap_err();
    assert_eq!(messages(&errs), vec![r#"unrecognized property "dynamic""#]);

    let mut props = Props {
      dynamic: DynProperties::new(Box::new(Nested::default())),
      ..Props::default()
    };
    unpack_properties(def.properties(), &mut [&mut props]).unwrap();
    let inner = props.dynamic.get().unwrap().as_any().downcast_ref::<Nested>().unwrap();
    assert_eq!(inner.enabled, Some(true));
  }

  #[test]
  fn prefixed_paths_name_the_overlay() {
    let def = module(r#"m { arch: { arm: { cflags: ["-marm"], ldflags: ["-x"] } } }"#);
    let arch = &def.properties()[0];
    let Expression::Map(archs) = arch.value.eval() else {
      panic!("arch is a map");
    };
    let Expression::Map(arm) = archs.properties[0].value.eval() else {
      panic!("arm is a map");
    };

    let mut nested = Nested::default();
    let mut unpacker = Unpacker::with_prefix(&arm.properties, "arch.arm", UnpackOptions::only_tagged(Tags::ARCH_VARIANT));
    unpacker.unpack(&mut nested);
    let errs = unpacker.finish().unwrap_err();

    assert_eq!(nested.cflags, vec!["-marm"]);
    assert_eq!(messages(&errs), vec![r#"unrecognized property "arch.arm.ldflags""#]);
  }

  #[test]
  fn errors_are_capped() {
    let src: String = format!(
      "m {{ {} }}",
      (0..30).map(|i| format!("p{}: 1,", i)).collect::<String>()
    );
    let def = module(&src);
    let mut props = Props::default();
    let errs = unpack_properties(def.properties(), &mut [&mut props]).unwrap_err();
    assert_eq!(errs.len(), MAX_ERRORS);
  }
}
