//! The extension algebra over property structs.
//!
//! [`extend_properties`] merges a source struct into a destination struct of
//! the same type. [`extend_matching_properties`] merges one source into
//! destinations of arbitrary types, field by field wherever the property names
//! and kinds line up; it is how architecture overlays land on a module's
//! property roots.
//!
//! Per-field behaviour for each [`Order`]:
//!
//! | kind            | Append            | Prepend           | Replace                 |
//! |-----------------|-------------------|-------------------|-------------------------|
//! | bool            | dst or src        | dst or src        | dst or src              |
//! | int64           | src if non-zero   | dst if non-zero   | src if non-zero         |
//! | string          | dst + src         | src + dst         | dst + src               |
//! | optional scalar | src if set        | dst if set        | src if set              |
//! | list            | dst then src      | src then dst      | src if non-empty        |
//! | set             | union             | union             | src if non-empty        |
//! | map             | union, src wins   | union, dst wins   | src if non-empty        |
//!
//! A list or map with no elements is the unset value, so `Replace` with an
//! empty source leaves the destination alone.

use std::collections::BTreeMap;

use super::PropertyError;
use super::schema::{Field, FieldMut, FieldRef, PropertyStruct, same_type};

/// How source values combine with destination values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
  #[default]
  Append,
  Prepend,
  Replace,
}

/// Where the source struct came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
  /// Values read from a build file; `mutated` fields are skipped.
  #[default]
  BuildFile,
  /// Values produced by a mutator; every field merges.
  Mutator,
}

/// What a filter gets to inspect before a field is merged.
pub struct FilterArgs<'a> {
  pub property: &'a str,
  pub field: &'a Field,
  pub dst: FieldRef<'a>,
  pub src: FieldRef<'a>,
}

/// Decides whether a field merges. Returning `Ok(false)` skips the field.
pub type ExtendFilter = dyn Fn(&FilterArgs<'_>) -> Result<bool, PropertyError> + Sync;

#[derive(Clone, Copy, Default)]
pub struct ExtendOptions<'f> {
  pub order: Order,
  pub origin: Origin,
  pub filter: Option<&'f ExtendFilter>,
}

impl<'f> ExtendOptions<'f> {
  pub fn new(order: Order) -> Self {
    Self {
      order,
      ..Self::default()
    }
  }

  pub fn origin(mut self, origin: Origin) -> Self {
    self.origin = origin;
    self
  }

  pub fn filter(mut self, filter: &'f ExtendFilter) -> Self {
    self.filter = Some(filter);
    self
  }
}

/// Merge `src` into `dst`. Both must be the same property struct type.
pub fn extend_properties(
  dst: &mut dyn PropertyStruct,
  src: &dyn PropertyStruct,
  options: ExtendOptions<'_>,
) -> Result<(), PropertyError> {
  if !same_type(dst, src) {
    return Err(PropertyError::unsupported(
      "",
      format!(
        "mismatched property struct types {} and {}",
        dst.type_name(),
        src.type_name()
      ),
    ));
  }
  extend_struct("", dst, src, options, false)
}

/// Merge `src` into every struct in `dsts`, matching fields by property name.
pub fn extend_matching_properties(
  dsts: &mut [&mut dyn PropertyStruct],
  src: &dyn PropertyStruct,
  options: ExtendOptions<'_>,
) -> Result<(), PropertyError> {
  for dst in dsts.iter_mut() {
    extend_struct("", &mut **dst, src, options, true)?;
  }
  Ok(())
}

pub fn append_properties(
  dst: &mut dyn PropertyStruct,
  src: &dyn PropertyStruct,
  filter: Option<&ExtendFilter>,
) -> Result<(), PropertyError> {
  extend_properties(dst, src, ExtendOptions { filter, ..ExtendOptions::new(Order::Append) })
}

pub fn prepend_properties(
  dst: &mut dyn PropertyStruct,
  src: &dyn PropertyStruct,
  filter: Option<&ExtendFilter>,
) -> Result<(), PropertyError> {
  extend_properties(dst, src, ExtendOptions { filter, ..ExtendOptions::new(Order::Prepend) })
}

pub fn append_matching_properties(
  dsts: &mut [&mut dyn PropertyStruct],
  src: &dyn PropertyStruct,
  filter: Option<&ExtendFilter>,
) -> Result<(), PropertyError> {
  extend_matching_properties(dsts, src, ExtendOptions { filter, ..ExtendOptions::new(Order::Append) })
}

pub fn prepend_matching_properties(
  dsts: &mut [&mut dyn PropertyStruct],
  src: &dyn PropertyStruct,
  filter: Option<&ExtendFilter>,
) -> Result<(), PropertyError> {
  extend_matching_properties(dsts, src, ExtendOptions { filter, ..ExtendOptions::new(Order::Prepend) })
}

fn flatten<'s>(src: &'s dyn PropertyStruct, out: &mut Vec<(&'static Field, FieldRef<'s>)>) {
  for (field, value) in src.fields().iter().zip(src.field_refs()) {
    if field.is_embedded()
      && let FieldRef::Struct(inner) = value
    {
      flatten(inner, out);
    } else {
      out.push((field, value));
    }
  }
}

fn extend_struct(
  prefix: &str,
  dst: &mut dyn PropertyStruct,
  src: &dyn PropertyStruct,
  options: ExtendOptions<'_>,
  matching: bool,
) -> Result<(), PropertyError> {
  let mut src_fields = Vec::new();
  flatten(src, &mut src_fields);
  extend_fields(prefix, dst, &src_fields, options, matching)
}

fn extend_fields(
  prefix: &str,
  dst: &mut dyn PropertyStruct,
  src_fields: &[(&'static Field, FieldRef<'_>)],
  options: ExtendOptions<'_>,
  matching: bool,
) -> Result<(), PropertyError> {
  let fields = dst.fields();
  for (field, dval) in fields.iter().zip(dst.field_muts()) {
    if field.is_embedded() {
      if let FieldMut::Struct(inner) = dval {
        extend_fields(prefix, inner, src_fields, options, matching)?;
      }
      continue;
    }

    let Some((sfield, sval)) = src_fields.iter().find(|(f, _)| f.name == field.name) else {
      continue;
    };
    let path = format!("{}{}", prefix, field.property_name());

    if field.is_mutated() && options.origin == Origin::BuildFile {
      continue;
    }

    if let Some(filter) = options.filter {
      let args = FilterArgs {
        property: &path,
        field,
        dst: dval.as_ref(),
        src: *sval,
      };
      if !filter(&args)? {
        continue;
      }
    }

    if field.kind.is_struct() || sfield.kind.is_struct() {
      if !(field.kind.is_struct() && sfield.kind.is_struct()) {
        return Err(mismatch(&path, field, sfield));
      }
      extend_nested(&path, dval, *sval, options, matching)?;
      continue;
    }

    if field.kind != sfield.kind {
      return Err(mismatch(&path, field, sfield));
    }
    extend_leaf(&path, dval, *sval, options.order)?;
  }
  Ok(())
}

fn mismatch(path: &str, dst: &Field, src: &Field) -> PropertyError {
  PropertyError::unsupported(
    path,
    format!(
      "mismatched types for property {:?}: {:?} and {:?}",
      path, dst.kind, src.kind
    ),
  )
}

fn extend_nested(
  path: &str,
  dval: FieldMut<'_>,
  sval: FieldRef<'_>,
  options: ExtendOptions<'_>,
  matching: bool,
) -> Result<(), PropertyError> {
  let src_inner = match sval {
    FieldRef::Struct(s) => Some(s),
    FieldRef::OptionalStruct(o) => o.get(),
    FieldRef::Dynamic(d) => d.get(),
    _ => None,
  };
  let Some(src_inner) = src_inner else {
    return Ok(());
  };

  let dynamic = matches!(dval, FieldMut::Dynamic(_)) || matches!(sval, FieldRef::Dynamic(_));
  let dst_inner: &mut dyn PropertyStruct = match dval {
    FieldMut::Struct(d) => d,
    FieldMut::OptionalStruct(o) => o.get_or_insert(),
    FieldMut::Dynamic(d) => &mut **d.0.get_or_insert_with(|| src_inner.zeroed()),
    _ => return Err(PropertyError::Internal(format!("{} is not a struct", path))),
  };

  if (dynamic || !matching) && !same_type(dst_inner, src_inner) {
    return Err(PropertyError::unsupported(
      path,
      format!(
        "mismatched property struct types for {:?}: {} and {}",
        path,
        dst_inner.type_name(),
        src_inner.type_name()
      ),
    ));
  }
  extend_struct(&format!("{}.", path), dst_inner, src_inner, options, matching)
}

fn merge_option<T: Clone>(dst: &mut Option<T>, src: &Option<T>, order: Order) {
  match order {
    Order::Prepend => {
      if dst.is_none() {
        dst.clone_from(src);
      }
    }
    Order::Append | Order::Replace => {
      if src.is_some() {
        dst.clone_from(src);
      }
    }
  }
}

fn merge_map(dst: &mut BTreeMap<String, String>, src: &BTreeMap<String, String>, order: Order) {
  match order {
    Order::Append => dst.extend(src.iter().map(|(k, v)| (k.clone(), v.clone()))),
    Order::Prepend => {
      for (k, v) in src {
        dst.entry(k.clone()).or_insert_with(|| v.clone());
      }
    }
    Order::Replace => {
      if !src.is_empty() {
        dst.clone_from(src);
      }
    }
  }
}

fn extend_leaf(path: &str, dval: FieldMut<'_>, sval: FieldRef<'_>, order: Order) -> Result<(), PropertyError> {
  match (dval, sval) {
    (FieldMut::Bool(d), FieldRef::Bool(s)) => *d = *d || *s,
    (FieldMut::Int64(d), FieldRef::Int64(s)) => match order {
      Order::Prepend => {
        if *d == 0 {
          *d = *s;
        }
      }
      Order::Append | Order::Replace => {
        if *s != 0 {
          *d = *s;
        }
      }
    },
    (FieldMut::String(d), FieldRef::String(s)) => match order {
      Order::Prepend => d.insert_str(0, s),
      Order::Append | Order::Replace => d.push_str(s),
    },
    (FieldMut::OptionalBool(d), FieldRef::OptionalBool(s)) => merge_option(d, s, order),
    (FieldMut::OptionalInt64(d), FieldRef::OptionalInt64(s)) => merge_option(d, s, order),
    (FieldMut::OptionalString(d), FieldRef::OptionalString(s)) => merge_option(d, s, order),
    (FieldMut::StringList(d), FieldRef::StringList(s)) => match order {
      Order::Append => d.extend(s.iter().cloned()),
      Order::Prepend => {
        let mut merged = s.clone();
        merged.append(d);
        *d = merged;
      }
      Order::Replace => {
        if !s.is_empty() {
          d.clone_from(s);
        }
      }
    },
    (FieldMut::StringSet(d), FieldRef::StringSet(s)) => {
      if order == Order::Replace && !s.is_empty() {
        d.clone_from(s);
      } else {
        d.extend(s.iter().cloned());
      }
    }
    (FieldMut::StringMap(d), FieldRef::StringMap(s)) => merge_map(d, s, order),
    (FieldMut::StructList(d), FieldRef::StructList(s)) => {
      if !d.extend_from(s, order == Order::Prepend, order == Order::Replace) {
        return Err(PropertyError::unsupported(
          path,
          format!("mismatched element types for list property {:?}", path),
        ));
      }
    }
    _ => {
      return Err(PropertyError::Internal(format!(
        "cannot extend property {:?}: field kinds differ",
        path
      )));
    }
  }
  Ok(())
}
