//! Strings in manifest syntax with their variable references resolved.
//!
//! Commands, descriptions and argument values are written the way they will
//! appear in the manifest: `$name` and `${name}` reference variables and `$$`,
//! `$ ` and `$:` are escapes. A newline is never allowed, escaped or not,
//! since it would end the manifest line early. Parsing splits a string into literal
//! text and references and checks every reference against the scope the
//! string will be evaluated in, so that an undefined variable is reported at
//! declaration time instead of by the build runner.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NinjaStringError {
  #[error("invalid character after '$' at byte {offset} in {value:?}")]
  InvalidEscape { value: String, offset: usize },

  #[error("unterminated variable reference in {0:?}")]
  Unterminated(String),

  #[error("empty variable name in {0:?}")]
  EmptyName(String),

  #[error("undefined variable {name:?} in {value:?}")]
  Undefined { name: String, value: String },

  #[error("newline at byte {offset} in {value:?}")]
  Newline { value: String, offset: usize },
}

/// Where a referenced variable lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VarRef {
  /// A package context variable, by package and variable name.
  Global { pkg: &'static str, name: String },
  /// A variable declared by the module being generated.
  Local(String),
  /// A rule argument.
  Arg(String),
  /// A variable the build runner defines itself, such as `in` or `out`.
  Builtin(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Segment {
  /// Escaped text, copied to the manifest unchanged.
  Literal(String),
  Var(VarRef),
}

/// A parsed and resolved manifest string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NinjaString {
  pub(crate) segments: Vec<Segment>,
}

/// Variables the build runner defines for every build statement.
pub(crate) const BUILTINS: &[&str] = &["in", "out", "in_newline", "depfile", "rspfile"];

/// Parse `value`, resolving each reference with `lookup`.
pub(crate) fn parse_ninja_string(
  value: &str,
  lookup: &dyn Fn(&str) -> Option<VarRef>,
) -> Result<NinjaString, NinjaStringError> {
  if let Some(offset) = value.find('\n') {
    return Err(NinjaStringError::Newline {
      value: value.to_string(),
      offset,
    });
  }
  let mut segments = Vec::new();
  let mut literal = String::new();
  let bytes = value.as_bytes();
  let mut i = 0;

  while i < bytes.len() {
    if bytes[i] != b'$' {
      let next = value[i..].find('$').map_or(value.len(), |n| i + n);
      literal.push_str(&value[i..next]);
      i = next;
      continue;
    }
    let Some(&c) = bytes.get(i + 1) else {
      return Err(NinjaStringError::InvalidEscape {
        value: value.to_string(),
        offset: i,
      });
    };
    match c {
      b'$' | b' ' | b':' => {
        literal.push('$');
        literal.push(c as char);
        i += 2;
      }
      b'{' => {
        let Some(close) = value[i + 2..].find('}') else {
          return Err(NinjaStringError::Unterminated(value.to_string()));
        };
        let name = &value[i + 2..i + 2 + close];
        if name.is_empty() {
          return Err(NinjaStringError::EmptyName(value.to_string()));
        }
        if !name.bytes().all(is_var_char) {
          return Err(NinjaStringError::InvalidEscape {
            value: value.to_string(),
            offset: i + 2,
          });
        }
        flush(&mut literal, &mut segments);
        segments.push(Segment::Var(resolve(name, value, lookup)?));
        i += close + 3;
      }
      c if is_simple_var_char(c) => {
        let len = value[i + 1..].bytes().take_while(|b| is_simple_var_char(*b)).count();
        let name = &value[i + 1..i + 1 + len];
        flush(&mut literal, &mut segments);
        segments.push(Segment::Var(resolve(name, value, lookup)?));
        i += len + 1;
      }
      _ => {
        return Err(NinjaStringError::InvalidEscape {
          value: value.to_string(),
          offset: i,
        });
      }
    }
  }
  flush(&mut literal, &mut segments);
  Ok(NinjaString { segments })
}

fn flush(literal: &mut String, segments: &mut Vec<Segment>) {
  if !literal.is_empty() {
    segments.push(Segment::Literal(std::mem::take(literal)));
  }
}

fn resolve(name: &str, value: &str, lookup: &dyn Fn(&str) -> Option<VarRef>) -> Result<VarRef, NinjaStringError> {
  lookup(name).ok_or_else(|| NinjaStringError::Undefined {
    name: name.to_string(),
    value: value.to_string(),
  })
}

fn is_var_char(b: u8) -> bool {
  b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.')
}

// `$a.b` stops at the dot, like the build runner does
fn is_simple_var_char(b: u8) -> bool {
  b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-')
}

impl NinjaString {
  /// A string with no references, escaping `value` as needed.
  pub fn literal(value: &str) -> Self {
    let escaped = value.replace('$', "$$");
    let segments = if escaped.is_empty() { Vec::new() } else { vec![Segment::Literal(escaped)] };
    Self { segments }
  }

  pub fn is_empty(&self) -> bool {
    self.segments.is_empty()
  }

  pub fn refs(&self) -> impl Iterator<Item = &VarRef> {
    self.segments.iter().filter_map(|s| match s {
      Segment::Var(v) => Some(v),
      Segment::Literal(_) => None,
    })
  }

  /// Manifest text, naming each reference with `name`.
  pub(crate) fn render(&self, name: &dyn Fn(&VarRef) -> String) -> String {
    let mut out = String::new();
    for segment in &self.segments {
      match segment {
        Segment::Literal(text) => out.push_str(text),
        Segment::Var(var) => {
          out.push_str("${");
          out.push_str(&name(var));
          out.push('}');
        }
      }
    }
    out
  }
}

impl fmt::Display for VarRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      VarRef::Global { pkg, name } => write!(f, "{}.{}", pkg, name),
      VarRef::Local(name) | VarRef::Arg(name) => f.write_str(name),
      VarRef::Builtin(name) => f.write_str(name),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scope(name: &str) -> Option<VarRef> {
    match name {
      "cc" => Some(VarRef::Global {
        pkg: "cc",
        name: "cc".to_string(),
      }),
      "flags" => Some(VarRef::Arg("flags".to_string())),
      _ => BUILTINS.iter().copied().find(|b| *b == name).map(VarRef::Builtin),
    }
  }

  fn render(s: &NinjaString) -> String {
    s.render(&|v| v.to_string())
  }

  #[test]
  fn parses_references_and_escapes() {
    let s = parse_ninja_string("${cc} $flags -o $out $in && echo $$HOME$:x", &scope).unwrap();
    assert_eq!(
      s.refs().cloned().collect::<Vec<_>>(),
      vec![
        VarRef::Global {
          pkg: "cc",
          name: "cc".to_string()
        },
        VarRef::Arg("flags".to_string()),
        VarRef::Builtin("out"),
        VarRef::Builtin("in"),
      ]
    );
    assert_eq!(render(&s), "${cc.cc} ${flags} -o ${out} ${in} && echo $$HOME$:x");
  }

  #[test]
  fn rejects_bad_references() {
    assert_eq!(
      parse_ninja_string("echo $nope", &scope),
      Err(NinjaStringError::Undefined {
        name: "nope".to_string(),
        value: "echo $nope".to_string()
      })
    );
    assert!(matches!(
      parse_ninja_string("echo ${out", &scope),
      Err(NinjaStringError::Unterminated(_))
    ));
    assert!(matches!(
      parse_ninja_string("trailing $", &scope),
      Err(NinjaStringError::InvalidEscape { offset: 9, .. })
    ));
    assert!(matches!(parse_ninja_string("${}", &scope), Err(NinjaStringError::EmptyName(_))));
  }

  #[test]
  fn newlines_are_rejected() {
    assert_eq!(
      parse_ninja_string("touch $out\nrm -rf /tmp/x", &scope),
      Err(NinjaStringError::Newline {
        value: "touch $out\nrm -rf /tmp/x".to_string(),
        offset: 10
      })
    );
    assert!(matches!(
      parse_ninja_string("a $\nb", &scope),
      Err(NinjaStringError::Newline { offset: 3, .. })
    ));
  }

  #[test]
  fn literal_escapes_dollars() {
    let s = NinjaString::literal("a$b");
    assert_eq!(render(&s), "a$$b");
    assert!(NinjaString::literal("").is_empty());
  }
}
