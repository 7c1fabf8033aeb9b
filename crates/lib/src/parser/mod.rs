//! Build file parsing.
//!
//! A build file is a sequence of module definitions (`type { prop: value }`)
//! and file-scoped variable assignments (`x = value`, `x += value`). The
//! parser folds variables and `+` operators at parse time so that consumers
//! only ever look at concrete values through [`Expression::eval`].
//!
//! Lexical errors and syntax errors stop the file; semantic errors such as
//! undefined variables are collected, up to [`MAX_ERRORS`](crate::consts::MAX_ERRORS).

pub mod ast;
mod lexer;
mod parse;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use ast::{
  AssignOp, Assignment, Definition, Expression, File, List, Map, ModuleDef, Operator, Pos, Property, ValueType,
  Variable,
};

/// An error produced while reading a build file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ParseError {
  pub pos: Pos,
  pub err: String,
}

impl ParseError {
  pub fn new(pos: Pos, err: impl Into<String>) -> Self {
    Self { pos, err: err.into() }
  }
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.pos, self.err)
  }
}

/// Parse a build file.
///
/// Returns every definition in source order, or up to [`MAX_ERRORS`](crate::consts::MAX_ERRORS) errors.
pub fn parse(file_name: &str, src: &str) -> Result<File, Vec<ParseError>> {
  let file: Arc<str> = Arc::from(file_name);
  let tokens = lexer::Lexer::new(file, src).tokenize().map_err(|e| vec![e])?;
  parse::Parser::new(tokens).parse_file(file_name)
}
