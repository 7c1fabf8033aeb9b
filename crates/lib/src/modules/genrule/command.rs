//! `$(...)` expansion in genrule commands.
//!
//! # Variables
//!
//! - `$(in)` - every input, space separated
//! - `$(out)` - every output, space separated
//! - `$(genDir)` - the directory outputs are written to
//! - `$(depfile)` - the dep file, when `depfile: true`
//! - `$(location LABEL)` - the single file of a tool, tool file or source
//! - `$(locations LABEL)` - every file of a tool, tool file or source
//! - `$(location)` - the first tool or tool file
//!
//! `$$` is a literal `$`, passed through to the shell.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
  Literal(String),
  Var { name: String, arg: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum CommandError {
  #[error("unterminated $( at offset {0}")]
  Unclosed(usize),

  #[error("$ must be followed by ( or $ at offset {0}")]
  BareDollar(usize),

  #[error("unknown variable '$({0})'")]
  UnknownVar(String),

  #[error("unknown location label {0:?}")]
  UnknownLabel(String),

  #[error("label {0:?} has multiple files, use $(locations {0}) to reference it")]
  MultipleFiles(String),

  #[error("label {0:?} has no files")]
  NoFiles(String),

  #[error("at least one `tools` or `tool_files` is required if $(location) is used")]
  NoTools,

  #[error("$(depfile) used without depfile property")]
  NoDepfile,
}

/// Split a command into literal text and variable references.
pub(crate) fn parse(cmd: &str) -> Result<Vec<Segment>, CommandError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = cmd.char_indices();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }
    match chars.next() {
      Some((_, '$')) => literal.push('$'),
      Some((_, '(')) => {
        let mut body = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
          if c == ')' {
            closed = true;
            break;
          }
          body.push(c);
        }
        if !closed {
          return Err(CommandError::Unclosed(pos));
        }
        if !literal.is_empty() {
          segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        let body = body.trim();
        let (name, arg) = match body.split_once(char::is_whitespace) {
          Some((name, arg)) => (name.to_string(), Some(arg.trim().to_string())),
          None => (body.to_string(), None),
        };
        segments.push(Segment::Var { name, arg });
      }
      _ => return Err(CommandError::BareDollar(pos)),
    }
  }
  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }
  Ok(segments)
}

/// Supplies the values of command variables.
pub(crate) trait Resolver {
  fn resolve(&self, name: &str, arg: Option<&str>) -> Result<String, CommandError>;
}

/// Expand every variable of `cmd`.
pub(crate) fn expand(cmd: &str, resolver: &dyn Resolver) -> Result<String, CommandError> {
  let mut out = String::new();
  for segment in parse(cmd)? {
    match segment {
      Segment::Literal(text) => out.push_str(&text),
      Segment::Var { name, arg } => out.push_str(&resolver.resolve(&name, arg.as_deref())?),
    }
  }
  Ok(out)
}
