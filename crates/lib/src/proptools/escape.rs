//! Escaping for manifest and shell strings.

/// Escape `$`, `:` and spaces so that a string survives the manifest reader.
pub fn ninja_escape(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    match c {
      '$' | ':' | ' ' => {
        out.push('$');
        out.push(c);
      }
      _ => out.push(c),
    }
  }
  out
}

pub fn ninja_escape_list<S: AsRef<str>>(list: &[S]) -> Vec<String> {
  list.iter().map(|s| ninja_escape(s.as_ref())).collect()
}

fn needs_shell_quoting(s: &str) -> bool {
  s.is_empty()
    || s.chars().any(|c| {
      !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '+' | '=' | ',' | '@' | '%' | ':'))
    })
}

/// Quote a string for POSIX shells using single quotes.
pub fn shell_escape(s: &str) -> String {
  if !needs_shell_quoting(s) {
    return s.to_string();
  }
  format!("'{}'", s.replace('\'', r"'\''"))
}

pub fn shell_escape_list<S: AsRef<str>>(list: &[S]) -> Vec<String> {
  list.iter().map(|s| shell_escape(s.as_ref())).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ninja() {
    assert_eq!(ninja_escape("a b:$c"), "a$ b$:$$c");
    assert_eq!(ninja_escape_list(&["x y", "z"]), vec!["x$ y", "z"]);
  }

  #[test]
  fn shell() {
    assert_eq!(shell_escape("out/a.txt"), "out/a.txt");
    assert_eq!(shell_escape("a b"), "'a b'");
    assert_eq!(shell_escape("it's"), r"'it'\''s'");
    assert_eq!(shell_escape(""), "''");
    assert_eq!(shell_escape_list(&["$x"]), vec!["'$x'"]);
  }
}
