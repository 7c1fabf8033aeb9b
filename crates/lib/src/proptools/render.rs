//! Rendering property structs back into property syntax.
//!
//! Zero-valued fields are omitted and `mutated` fields are never rendered, so
//! unpacking the rendered properties into a zero struct reproduces the input.

use crate::parser::{Expression, List, Map, Pos, Property};

use super::schema::{FieldRef, PropertyStruct};

fn string(value: &str) -> Expression {
  Expression::String {
    pos: Pos::synthetic(),
    value: value.to_string(),
  }
}

fn list(values: Vec<Expression>) -> Expression {
  Expression::List(List {
    lbracket: Pos::synthetic(),
    rbracket: Pos::synthetic(),
    values,
  })
}

fn map(properties: Vec<Property>) -> Expression {
  Expression::Map(Map {
    lbrace: Pos::synthetic(),
    rbrace: Pos::synthetic(),
    properties,
  })
}

/// Render the non-zero fields of `props` as a property list.
pub fn render_struct(props: &dyn PropertyStruct) -> Vec<Property> {
  let mut out = Vec::new();
  render_into(props, &mut out);
  out
}

/// Render several property roots into one property list.
pub fn render_properties(roots: &[&dyn PropertyStruct]) -> Vec<Property> {
  let mut out = Vec::new();
  for root in roots {
    render_into(*root, &mut out);
  }
  out
}

fn render_into(props: &dyn PropertyStruct, out: &mut Vec<Property>) {
  for (field, value) in props.fields().iter().zip(props.field_refs()) {
    if field.is_embedded() {
      if let FieldRef::Struct(inner) = value {
        render_into(inner, out);
      }
      continue;
    }
    if field.is_mutated() {
      continue;
    }
    if let Some(expr) = render_value(value) {
      out.push(Property::new(field.property_name(), expr));
    }
  }
}

fn render_value(value: FieldRef<'_>) -> Option<Expression> {
  if value.is_zero() {
    return None;
  }
  let pos = Pos::synthetic();
  let expr = match value {
    FieldRef::Bool(v) | FieldRef::OptionalBool(Some(v)) => Expression::Bool { pos, value: *v },
    FieldRef::Int64(v) | FieldRef::OptionalInt64(Some(v)) => Expression::Int64 { pos, value: *v },
    FieldRef::String(v) | FieldRef::OptionalString(Some(v)) => string(v),
    FieldRef::StringList(v) => list(v.iter().map(|s| string(s)).collect()),
    FieldRef::StringSet(v) => list(v.iter().map(|s| string(s)).collect()),
    FieldRef::StringMap(v) => map(v.iter().map(|(k, s)| Property::new(k.clone(), string(s))).collect()),
    FieldRef::Struct(inner) => map(render_struct(inner)),
    FieldRef::OptionalStruct(inner) => map(render_struct(inner.get()?)),
    FieldRef::Dynamic(inner) => map(render_struct(inner.get()?)),
    FieldRef::StructList(items) => list(
      (0..items.len())
        .filter_map(|i| items.get(i))
        .map(|item| map(render_struct(item)))
        .collect(),
    ),
    FieldRef::OptionalBool(None) | FieldRef::OptionalInt64(None) | FieldRef::OptionalString(None) => return None,
  };
  Some(expr)
}

#[cfg(test)]
mod tests {
  use std::collections::{BTreeMap, BTreeSet};

  use super::*;
  use crate::proptools::{DynProperties, UnpackOptions, Unpacker};

  crate::property_struct! {
    struct Leaf {
      x: Vec<String>,
      flag: Option<bool>,
    }
  }

  crate::property_struct! {
    struct Base {
      shared: String,
    }
  }

  crate::property_struct! {
    struct Props {
      base: Base => [embed],
      b: bool,
      i: i64,
      s: String,
      ob: Option<bool>,
      oi: Option<i64>,
      os: Option<String>,
      l: Vec<String>,
      set: BTreeSet<String>,
      env: BTreeMap<String, String>,
      nested: Leaf,
      ptr: Option<Box<Leaf>>,
      items: Vec<Leaf>,
      dynamic: DynProperties,
    }
  }

  fn round_trip(input: &Props) -> Props {
    let rendered = render_struct(input);
    let mut out = Props {
      dynamic: input.dynamic.get().map(|d| DynProperties::new(d.zeroed())).unwrap_or_default(),
      ..Props::default()
    };
    let mut unpacker = Unpacker::new(&rendered, UnpackOptions::default());
    unpacker.unpack(&mut out);
    unpacker.finish().unwrap();
    out
  }

  #[test]
  fn unpack_of_render_is_identity() {
    let full = Props {
      base: Base {
        shared: "common".to_string(),
      },
      b: true,
      i: -7,
      s: "str".to_string(),
      ob: Some(false),
      oi: Some(0),
      os: Some(String::new()),
      l: vec!["b".to_string(), "a".to_string(), "b".to_string()],
      set: ["z".to_string(), "y".to_string()].into_iter().collect(),
      env: [("K".to_string(), "V".to_string())].into_iter().collect(),
      nested: Leaf {
        x: vec!["n".to_string()],
        flag: None,
      },
      ptr: Some(Box::default()),
      items: vec![
        Leaf::default(),
        Leaf {
          x: vec!["i".to_string()],
          flag: Some(true),
        },
      ],
      dynamic: DynProperties::new(Box::new(Leaf {
        x: vec!["d".to_string()],
        flag: Some(true),
      })),
    };

    for input in [Props::default(), full] {
      assert_eq!(round_trip(&input), input);
    }
  }

  #[test]
  fn embedded_fields_render_flat() {
    let props = Props {
      base: Base {
        shared: "x".to_string(),
      },
      ..Props::default()
    };
    let rendered = render_struct(&props);
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].name, "shared");
  }
}
