//! Syntax tree for build files.
//!
//! Values carry their source position. Variable references and `+` operators
//! are kept as unevaluated nodes that remember the concrete value computed at
//! parse time; [`Expression::eval`] returns that value.

use std::fmt;
use std::sync::Arc;

/// A position in a build file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
  pub file: Arc<str>,
  pub line: u32,
  pub column: u32,
}

impl Pos {
  pub fn new(file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
    Self {
      file: file.into(),
      line,
      column,
    }
  }

  /// Position used for nodes that did not come from a file.
  pub fn synthetic() -> Self {
    Self::new("<generated>", 0, 0)
  }

  pub fn is_synthetic(&self) -> bool {
    self.line == 0
  }
}

impl fmt::Display for Pos {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}:{}", self.file, self.line, self.column)
  }
}

/// The type tag of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
  Bool,
  Int64,
  String,
  List,
  Map,
  Unevaluated,
}

impl fmt::Display for ValueType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ValueType::Bool => "bool",
      ValueType::Int64 => "int64",
      ValueType::String => "string",
      ValueType::List => "list",
      ValueType::Map => "map",
      ValueType::Unevaluated => "unevaluated",
    };
    f.write_str(name)
  }
}

/// A `name: value` pair inside a module definition or a map.
#[derive(Debug, Clone)]
pub struct Property {
  pub name: String,
  pub name_pos: Pos,
  pub colon_pos: Pos,
  pub value: Expression,
}

impl Property {
  pub fn new(name: impl Into<String>, value: Expression) -> Self {
    let pos = value.pos().clone();
    Self {
      name: name.into(),
      name_pos: pos.clone(),
      colon_pos: pos,
      value,
    }
  }
}

impl PartialEq for Property {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name && self.value == other.value
  }
}

#[derive(Debug, Clone)]
pub struct List {
  pub lbracket: Pos,
  pub rbracket: Pos,
  pub values: Vec<Expression>,
}

/// A map literal. Properties keep their source order; equality ignores it.
#[derive(Debug, Clone)]
pub struct Map {
  pub lbrace: Pos,
  pub rbrace: Pos,
  pub properties: Vec<Property>,
}

impl Map {
  pub fn get(&self, name: &str) -> Option<&Property> {
    self.properties.iter().find(|p| p.name == name)
  }
}

impl PartialEq for Map {
  fn eq(&self, other: &Self) -> bool {
    self.properties.len() == other.properties.len()
      && self
        .properties
        .iter()
        .all(|p| other.get(&p.name).is_some_and(|o| o.value == p.value))
  }
}

/// A reference to a file-scoped variable, with the value it had when referenced.
#[derive(Debug, Clone)]
pub struct Variable {
  pub name: String,
  pub pos: Pos,
  pub value: Box<Expression>,
}

/// A binary operator (`+`) with its evaluated result.
#[derive(Debug, Clone)]
pub struct Operator {
  pub operator: char,
  pub op_pos: Pos,
  pub args: Box<[Expression; 2]>,
  pub value: Box<Expression>,
}

#[derive(Debug, Clone)]
pub enum Expression {
  Bool { pos: Pos, value: bool },
  Int64 { pos: Pos, value: i64 },
  String { pos: Pos, value: String },
  List(List),
  Map(Map),
  Variable(Variable),
  Operator(Operator),
}

impl Expression {
  pub fn string(value: impl Into<String>) -> Self {
    Expression::String {
      pos: Pos::synthetic(),
      value: value.into(),
    }
  }

  pub fn value_type(&self) -> ValueType {
    match self {
      Expression::Bool { .. } => ValueType::Bool,
      Expression::Int64 { .. } => ValueType::Int64,
      Expression::String { .. } => ValueType::String,
      Expression::List(_) => ValueType::List,
      Expression::Map(_) => ValueType::Map,
      Expression::Variable(_) | Expression::Operator(_) => ValueType::Unevaluated,
    }
  }

  /// Returns the concrete node behind variables and operators.
  pub fn eval(&self) -> &Expression {
    match self {
      Expression::Variable(v) => v.value.eval(),
      Expression::Operator(o) => o.value.eval(),
      other => other,
    }
  }

  pub fn pos(&self) -> &Pos {
    match self {
      Expression::Bool { pos, .. } | Expression::Int64 { pos, .. } | Expression::String { pos, .. } => pos,
      Expression::List(l) => &l.lbracket,
      Expression::Map(m) => &m.lbrace,
      Expression::Variable(v) => &v.pos,
      Expression::Operator(o) => o.args[0].pos(),
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self.eval() {
      Expression::String { value, .. } => Some(value),
      _ => None,
    }
  }
}

impl PartialEq for Expression {
  fn eq(&self, other: &Self) -> bool {
    match (self.eval(), other.eval()) {
      (Expression::Bool { value: a, .. }, Expression::Bool { value: b, .. }) => a == b,
      (Expression::Int64 { value: a, .. }, Expression::Int64 { value: b, .. }) => a == b,
      (Expression::String { value: a, .. }, Expression::String { value: b, .. }) => a == b,
      (Expression::List(a), Expression::List(b)) => a.values == b.values,
      (Expression::Map(a), Expression::Map(b)) => a == b,
      _ => false,
    }
  }
}

/// A top-level `type { ... }` declaration.
#[derive(Debug, Clone)]
pub struct ModuleDef {
  pub type_name: String,
  pub type_pos: Pos,
  pub map: Map,
}

impl ModuleDef {
  pub fn properties(&self) -> &[Property] {
    &self.map.properties
  }

  /// The value of the `name` property, if it is a string.
  pub fn name(&self) -> Option<&str> {
    self.map.get("name").and_then(|p| p.value.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
  Set,
  Append,
}

/// A top-level `name = value` or `name += value` statement.
#[derive(Debug, Clone)]
pub struct Assignment {
  pub name: String,
  pub name_pos: Pos,
  pub op: AssignOp,
  pub value: Expression,
}

#[derive(Debug, Clone)]
pub enum Definition {
  Module(ModuleDef),
  Assignment(Assignment),
}

/// A parsed build file.
#[derive(Debug, Clone)]
pub struct File {
  pub name: String,
  pub defs: Vec<Definition>,
}

impl File {
  pub fn modules(&self) -> impl Iterator<Item = &ModuleDef> {
    self.defs.iter().filter_map(|d| match d {
      Definition::Module(m) => Some(m),
      Definition::Assignment(_) => None,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn s(value: &str, line: u32) -> Expression {
    Expression::String {
      pos: Pos::new("a.bp", line, 1),
      value: value.to_string(),
    }
  }

  #[test]
  fn equality_ignores_positions() {
    assert_eq!(s("x", 1), s("x", 7));
    assert_ne!(s("x", 1), s("y", 1));
  }

  #[test]
  fn maps_compare_as_unordered_sets() {
    let map = |props: Vec<Property>| {
      Expression::Map(Map {
        lbrace: Pos::synthetic(),
        rbrace: Pos::synthetic(),
        properties: props,
      })
    };
    let a = map(vec![Property::new("a", s("1", 1)), Property::new("b", s("2", 1))]);
    let b = map(vec![Property::new("b", s("2", 2)), Property::new("a", s("1", 2))]);
    let c = map(vec![Property::new("a", s("1", 1))]);

    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn eval_sees_through_variables() {
    let var = Expression::Variable(Variable {
      name: "v".to_string(),
      pos: Pos::new("a.bp", 3, 5),
      value: Box::new(s("hello", 1)),
    });
    assert_eq!(var.value_type(), ValueType::Unevaluated);
    assert_eq!(var.eval().value_type(), ValueType::String);
    assert_eq!(var.as_str(), Some("hello"));
  }
}
