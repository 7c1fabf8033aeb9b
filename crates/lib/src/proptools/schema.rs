//! Static descriptions of property structs.
//!
//! Property structs are declared with [`property_struct!`](crate::property_struct),
//! which generates the struct together with an implementation of
//! [`PropertyStruct`]. The implementation exposes a `'static` table of
//! [`Field`] descriptors and typed borrows of every field ([`FieldRef`] and
//! [`FieldMut`]), in declaration order. The unpack, extend and render drivers
//! walk those tables instead of inspecting types at runtime.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::names::property_name_for_field;

/// Annotations carried by a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tags(u8);

impl Tags {
  pub const NONE: Tags = Tags(0);
  pub const MUTATED: Tags = Tags(1);
  pub const ARCH_VARIANT: Tags = Tags(1 << 1);
  pub const PATH: Tags = Tags(1 << 2);
  pub const EMBED: Tags = Tags(1 << 3);

  pub const fn union(self, other: Tags) -> Tags {
    Tags(self.0 | other.0)
  }

  pub const fn contains(self, other: Tags) -> bool {
    self.0 & other.0 == other.0
  }

  pub const fn is_empty(self) -> bool {
    self.0 == 0
  }
}

/// Lowercase tag names accepted inside `[...]` in [`property_struct!`](crate::property_struct).
#[allow(non_upper_case_globals)]
pub mod tag {
  use super::Tags;

  pub const mutated: Tags = Tags::MUTATED;
  pub const arch_variant: Tags = Tags::ARCH_VARIANT;
  pub const path: Tags = Tags::PATH;
  pub const embed: Tags = Tags::EMBED;
}

/// The shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
  Bool,
  Int64,
  String,
  OptionalBool,
  OptionalInt64,
  OptionalString,
  StringList,
  StringSet,
  StringMap,
  Struct,
  OptionalStruct,
  StructList,
  Dynamic,
}

impl FieldKind {
  /// The property value type a build file must use for this field.
  pub fn expected(self) -> &'static str {
    match self {
      FieldKind::Bool | FieldKind::OptionalBool => "bool",
      FieldKind::Int64 | FieldKind::OptionalInt64 => "int64",
      FieldKind::String | FieldKind::OptionalString => "string",
      FieldKind::StringList | FieldKind::StringSet | FieldKind::StructList => "list",
      FieldKind::StringMap | FieldKind::Struct | FieldKind::OptionalStruct | FieldKind::Dynamic => "map",
    }
  }

  pub fn is_struct(self) -> bool {
    matches!(self, FieldKind::Struct | FieldKind::OptionalStruct | FieldKind::Dynamic)
  }
}

/// Static descriptor of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
  /// Rust field name.
  pub name: &'static str,
  pub kind: FieldKind,
  pub tags: Tags,
}

impl Field {
  /// The name used for this field in build files.
  pub fn property_name(&self) -> String {
    property_name_for_field(self.name)
  }

  /// Whether the field's contents are flattened into its parent.
  pub fn is_embedded(&self) -> bool {
    self.kind == FieldKind::Struct && (self.tags.contains(Tags::EMBED) || self.name == "blueprint_embed")
  }

  pub fn is_mutated(&self) -> bool {
    self.tags.contains(Tags::MUTATED)
  }
}

/// A strongly typed tree of properties.
pub trait PropertyStruct: Any + Send + Sync + fmt::Debug {
  fn type_name(&self) -> &'static str;

  /// Field descriptors, in the same order as [`field_refs`](Self::field_refs).
  fn fields(&self) -> &'static [Field];

  fn field_refs(&self) -> Vec<FieldRef<'_>>;

  fn field_muts(&mut self) -> Vec<FieldMut<'_>>;

  fn clone_box(&self) -> Box<dyn PropertyStruct>;

  /// A fresh, all-zero value of the same type.
  fn zeroed(&self) -> Box<dyn PropertyStruct>;

  fn as_any(&self) -> &dyn Any;

  fn as_any_mut(&mut self) -> &mut dyn Any;

  fn dyn_eq(&self, other: &dyn PropertyStruct) -> bool;
}

impl Clone for Box<dyn PropertyStruct> {
  fn clone(&self) -> Self {
    self.clone_box()
  }
}

impl PartialEq for Box<dyn PropertyStruct> {
  fn eq(&self, other: &Self) -> bool {
    self.dyn_eq(&**other)
  }
}

/// Same-type check for two trait objects.
pub fn same_type(a: &dyn PropertyStruct, b: &dyn PropertyStruct) -> bool {
  a.as_any().type_id() == b.as_any().type_id()
}

/// A field whose concrete property struct is chosen at runtime.
///
/// An empty slot is ignored by unpack, so build files may only set it once a
/// mutator or factory has installed a concrete value.
#[derive(Default)]
pub struct DynProperties(pub Option<Box<dyn PropertyStruct>>);

impl DynProperties {
  pub fn new(props: Box<dyn PropertyStruct>) -> Self {
    Self(Some(props))
  }

  pub fn get(&self) -> Option<&dyn PropertyStruct> {
    self.0.as_deref()
  }

  pub fn get_mut(&mut self) -> Option<&mut (dyn PropertyStruct + 'static)> {
    self.0.as_deref_mut()
  }
}

impl Clone for DynProperties {
  fn clone(&self) -> Self {
    Self(self.0.as_ref().map(|p| p.clone_box()))
  }
}

impl PartialEq for DynProperties {
  fn eq(&self, other: &Self) -> bool {
    match (&self.0, &other.0) {
      (None, None) => true,
      (Some(a), Some(b)) => a.dyn_eq(&**b),
      _ => false,
    }
  }
}

impl fmt::Debug for DynProperties {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.0 {
      Some(p) => f.debug_tuple("DynProperties").field(p).finish(),
      None => f.write_str("DynProperties(None)"),
    }
  }
}

/// Object-safe access to an `Option<Box<T>>` struct field.
pub trait OptionalStruct: Send + Sync {
  fn get(&self) -> Option<&dyn PropertyStruct>;
  fn get_mut(&mut self) -> Option<&mut dyn PropertyStruct>;
  fn get_or_insert(&mut self) -> &mut dyn PropertyStruct;
  /// A zero value of the pointee type.
  fn template(&self) -> Box<dyn PropertyStruct>;
}

impl<T: PropertyStruct + Default + Clone> OptionalStruct for Option<Box<T>> {
  fn get(&self) -> Option<&dyn PropertyStruct> {
    self.as_deref().map(|t| t as &dyn PropertyStruct)
  }

  fn get_mut(&mut self) -> Option<&mut dyn PropertyStruct> {
    self.as_deref_mut().map(|t| t as &mut dyn PropertyStruct)
  }

  fn get_or_insert(&mut self) -> &mut dyn PropertyStruct {
    &mut **self.get_or_insert_with(Box::default)
  }

  fn template(&self) -> Box<dyn PropertyStruct> {
    Box::new(T::default())
  }
}

/// Object-safe access to a `Vec<T>` of property structs.
pub trait StructList: Send + Sync {
  fn len(&self) -> usize;
  fn is_empty(&self) -> bool {
    self.len() == 0
  }
  fn get(&self, idx: usize) -> Option<&dyn PropertyStruct>;
  fn push_default(&mut self) -> &mut dyn PropertyStruct;
  fn template(&self) -> Box<dyn PropertyStruct>;
  fn as_any(&self) -> &dyn Any;
  /// Merge another list of the same element type. Returns false on a type mismatch.
  fn extend_from(&mut self, other: &dyn StructList, prepend: bool, replace: bool) -> bool;
}

impl<T: PropertyStruct + Default + Clone> StructList for Vec<T> {
  fn len(&self) -> usize {
    Vec::len(self)
  }

  fn get(&self, idx: usize) -> Option<&dyn PropertyStruct> {
    self.as_slice().get(idx).map(|t| t as &dyn PropertyStruct)
  }

  fn push_default(&mut self) -> &mut dyn PropertyStruct {
    self.push(T::default());
    let last = Vec::len(self) - 1;
    &mut self[last]
  }

  fn template(&self) -> Box<dyn PropertyStruct> {
    Box::new(T::default())
  }

  fn as_any(&self) -> &dyn Any {
    self
  }

  fn extend_from(&mut self, other: &dyn StructList, prepend: bool, replace: bool) -> bool {
    let Some(other) = other.as_any().downcast_ref::<Vec<T>>() else {
      return false;
    };
    if replace {
      if !other.is_empty() {
        *self = other.clone();
      }
    } else if prepend {
      let mut merged = other.clone();
      merged.append(self);
      *self = merged;
    } else {
      self.extend(other.iter().cloned());
    }
    true
  }
}

/// Shared borrow of one field.
#[derive(Clone, Copy)]
pub enum FieldRef<'a> {
  Bool(&'a bool),
  Int64(&'a i64),
  String(&'a String),
  OptionalBool(&'a Option<bool>),
  OptionalInt64(&'a Option<i64>),
  OptionalString(&'a Option<String>),
  StringList(&'a Vec<String>),
  StringSet(&'a BTreeSet<String>),
  StringMap(&'a BTreeMap<String, String>),
  Struct(&'a dyn PropertyStruct),
  OptionalStruct(&'a dyn OptionalStruct),
  StructList(&'a dyn StructList),
  Dynamic(&'a DynProperties),
}

impl FieldRef<'_> {
  /// Whether the field holds its zero value.
  pub fn is_zero(&self) -> bool {
    match self {
      FieldRef::Bool(v) => !**v,
      FieldRef::Int64(v) => **v == 0,
      FieldRef::String(v) => v.is_empty(),
      FieldRef::OptionalBool(v) => v.is_none(),
      FieldRef::OptionalInt64(v) => v.is_none(),
      FieldRef::OptionalString(v) => v.is_none(),
      FieldRef::StringList(v) => v.is_empty(),
      FieldRef::StringSet(v) => v.is_empty(),
      FieldRef::StringMap(v) => v.is_empty(),
      FieldRef::Struct(s) => s.field_refs().iter().all(|f| f.is_zero()),
      FieldRef::OptionalStruct(s) => s.get().is_none(),
      FieldRef::StructList(l) => l.is_empty(),
      FieldRef::Dynamic(d) => d.get().is_none(),
    }
  }

  /// The strings held by a string-valued field, in order.
  pub fn strings(&self) -> Vec<&str> {
    match self {
      FieldRef::String(v) if !v.is_empty() => vec![v.as_str()],
      FieldRef::OptionalString(Some(v)) => vec![v.as_str()],
      FieldRef::StringList(v) => v.iter().map(String::as_str).collect(),
      FieldRef::StringSet(v) => v.iter().map(String::as_str).collect(),
      _ => Vec::new(),
    }
  }
}

/// Exclusive borrow of one field.
pub enum FieldMut<'a> {
  Bool(&'a mut bool),
  Int64(&'a mut i64),
  String(&'a mut String),
  OptionalBool(&'a mut Option<bool>),
  OptionalInt64(&'a mut Option<i64>),
  OptionalString(&'a mut Option<String>),
  StringList(&'a mut Vec<String>),
  StringSet(&'a mut BTreeSet<String>),
  StringMap(&'a mut BTreeMap<String, String>),
  Struct(&'a mut dyn PropertyStruct),
  OptionalStruct(&'a mut dyn OptionalStruct),
  StructList(&'a mut dyn StructList),
  Dynamic(&'a mut DynProperties),
}

impl FieldMut<'_> {
  pub fn as_ref(&self) -> FieldRef<'_> {
    match self {
      FieldMut::Bool(v) => FieldRef::Bool(v),
      FieldMut::Int64(v) => FieldRef::Int64(v),
      FieldMut::String(v) => FieldRef::String(v),
      FieldMut::OptionalBool(v) => FieldRef::OptionalBool(v),
      FieldMut::OptionalInt64(v) => FieldRef::OptionalInt64(v),
      FieldMut::OptionalString(v) => FieldRef::OptionalString(v),
      FieldMut::StringList(v) => FieldRef::StringList(v),
      FieldMut::StringSet(v) => FieldRef::StringSet(v),
      FieldMut::StringMap(v) => FieldRef::StringMap(v),
      FieldMut::Struct(s) => FieldRef::Struct(&**s),
      FieldMut::OptionalStruct(s) => FieldRef::OptionalStruct(&**s),
      FieldMut::StructList(l) => FieldRef::StructList(&**l),
      FieldMut::Dynamic(d) => FieldRef::Dynamic(d),
    }
  }
}

/// Types that may appear as a field of a property struct.
pub trait PropertyField {
  const KIND: FieldKind;
  fn field_ref(&self) -> FieldRef<'_>;
  fn field_mut(&mut self) -> FieldMut<'_>;
}

macro_rules! leaf_field {
  ($ty:ty, $kind:ident) => {
    impl PropertyField for $ty {
      const KIND: FieldKind = FieldKind::$kind;

      fn field_ref(&self) -> FieldRef<'_> {
        FieldRef::$kind(self)
      }

      fn field_mut(&mut self) -> FieldMut<'_> {
        FieldMut::$kind(self)
      }
    }
  };
}

leaf_field!(bool, Bool);
leaf_field!(i64, Int64);
leaf_field!(String, String);
leaf_field!(Option<bool>, OptionalBool);
leaf_field!(Option<i64>, OptionalInt64);
leaf_field!(Option<String>, OptionalString);
leaf_field!(Vec<String>, StringList);
leaf_field!(BTreeSet<String>, StringSet);
leaf_field!(BTreeMap<String, String>, StringMap);
leaf_field!(DynProperties, Dynamic);

impl<T: PropertyStruct + Default + Clone> PropertyField for Option<Box<T>> {
  const KIND: FieldKind = FieldKind::OptionalStruct;

  fn field_ref(&self) -> FieldRef<'_> {
    FieldRef::OptionalStruct(self)
  }

  fn field_mut(&mut self) -> FieldMut<'_> {
    FieldMut::OptionalStruct(self)
  }
}

impl<T: PropertyStruct + Default + Clone> PropertyField for Vec<T> {
  const KIND: FieldKind = FieldKind::StructList;

  fn field_ref(&self) -> FieldRef<'_> {
    FieldRef::StructList(self)
  }

  fn field_mut(&mut self) -> FieldMut<'_> {
    FieldMut::StructList(self)
  }
}

/// Visit every field of `props`, descending into nested structs.
///
/// The callback receives the dotted property path, the descriptor and the
/// value. Embedded structs are flattened; struct lists are not entered.
pub fn walk_fields(props: &dyn PropertyStruct, f: &mut dyn FnMut(&str, &Field, FieldRef<'_>)) {
  walk_fields_prefixed("", props, f)
}

fn walk_fields_prefixed(prefix: &str, props: &dyn PropertyStruct, f: &mut dyn FnMut(&str, &Field, FieldRef<'_>)) {
  for (field, value) in props.fields().iter().zip(props.field_refs()) {
    if field.is_embedded() {
      if let FieldRef::Struct(inner) = value {
        walk_fields_prefixed(prefix, inner, f);
      }
      continue;
    }
    let path = format!("{}{}", prefix, field.property_name());
    f(&path, field, value);
    let nested = format!("{}.", path);
    match value {
      FieldRef::Struct(inner) => walk_fields_prefixed(&nested, inner, f),
      FieldRef::OptionalStruct(inner) => {
        if let Some(inner) = inner.get() {
          walk_fields_prefixed(&nested, inner, f);
        }
      }
      FieldRef::Dynamic(inner) => {
        if let Some(inner) = inner.get() {
          walk_fields_prefixed(&nested, inner, f);
        }
      }
      _ => {}
    }
  }
}

/// Mutable counterpart of [`walk_fields`] restricted to leaf fields.
pub fn walk_fields_mut(props: &mut dyn PropertyStruct, f: &mut dyn FnMut(&str, &Field, FieldMut<'_>)) {
  walk_fields_mut_prefixed("", props, f)
}

fn walk_fields_mut_prefixed(prefix: &str, props: &mut dyn PropertyStruct, f: &mut dyn FnMut(&str, &Field, FieldMut<'_>)) {
  let fields = props.fields();
  for (field, value) in fields.iter().zip(props.field_muts()) {
    if field.is_embedded() {
      if let FieldMut::Struct(inner) = value {
        walk_fields_mut_prefixed(prefix, inner, f);
      }
      continue;
    }
    let path = format!("{}{}", prefix, field.property_name());
    let nested = format!("{}.", path);
    match value {
      FieldMut::Struct(inner) => walk_fields_mut_prefixed(&nested, inner, f),
      FieldMut::OptionalStruct(inner) => {
        if let Some(inner) = inner.get_mut() {
          walk_fields_mut_prefixed(&nested, inner, f);
        }
      }
      FieldMut::Dynamic(inner) => {
        if let Some(inner) = inner.get_mut() {
          walk_fields_mut_prefixed(&nested, inner, f);
        }
      }
      FieldMut::StructList(_) => {}
      leaf => f(&path, field, leaf),
    }
  }
}

/// Declare a property struct.
///
/// Fields may be preceded by doc comments and followed by a bracketed tag
/// list drawn from `mutated`, `arch_variant`, `path` and `embed`:
///
/// ```
/// blueprint_lib::property_struct! {
///   pub struct Props {
///     /// Sources to compile.
///     pub srcs: Vec<String> => [arch_variant, path],
///     pub enabled: Option<bool>,
///   }
/// }
/// ```
#[macro_export]
macro_rules! property_struct {
  (
    $(#[$meta:meta])*
    $vis:vis struct $name:ident {
      $(
        $(#[doc = $doc:literal])*
        $fvis:vis $field:ident : $ty:ty $(=> [$($tag:ident),* $(,)?])?
      ),* $(,)?
    }
  ) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Default, PartialEq)]
    $vis struct $name {
      $(
        $(#[doc = $doc])*
        $fvis $field: $ty,
      )*
    }

    impl $crate::proptools::PropertyStruct for $name {
      fn type_name(&self) -> &'static str {
        stringify!($name)
      }

      fn fields(&self) -> &'static [$crate::proptools::Field] {
        const FIELDS: &[$crate::proptools::Field] = &[
          $(
            $crate::proptools::Field {
              name: stringify!($field),
              kind: <$ty as $crate::proptools::PropertyField>::KIND,
              tags: $crate::proptools::Tags::NONE $($(.union($crate::proptools::tag::$tag))*)?,
            },
          )*
        ];
        FIELDS
      }

      fn field_refs(&self) -> Vec<$crate::proptools::FieldRef<'_>> {
        vec![$($crate::proptools::PropertyField::field_ref(&self.$field)),*]
      }

      fn field_muts(&mut self) -> Vec<$crate::proptools::FieldMut<'_>> {
        vec![$($crate::proptools::PropertyField::field_mut(&mut self.$field)),*]
      }

      fn clone_box(&self) -> Box<dyn $crate::proptools::PropertyStruct> {
        Box::new(self.clone())
      }

      fn zeroed(&self) -> Box<dyn $crate::proptools::PropertyStruct> {
        Box::new(<$name as Default>::default())
      }

      fn as_any(&self) -> &dyn ::std::any::Any {
        self
      }

      fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
        self
      }

      fn dyn_eq(&self, other: &dyn $crate::proptools::PropertyStruct) -> bool {
        other.as_any().downcast_ref::<$name>().is_some_and(|o| self == o)
      }
    }

    impl $crate::proptools::PropertyField for $name {
      const KIND: $crate::proptools::FieldKind = $crate::proptools::FieldKind::Struct;

      fn field_ref(&self) -> $crate::proptools::FieldRef<'_> {
        $crate::proptools::FieldRef::Struct(self)
      }

      fn field_mut(&mut self) -> $crate::proptools::FieldMut<'_> {
        $crate::proptools::FieldMut::Struct(self)
      }
    }
  };
}
