//! The Make-style dep file written next to the manifest, listing every file
//! and directory the manifest was computed from.

use std::fs;
use std::io;
use std::path::Path;

fn escape(path: &str) -> String {
  let mut out = String::with_capacity(path.len());
  for c in path.chars() {
    match c {
      ' ' | '#' | '\\' => {
        out.push('\\');
        out.push(c);
      }
      '$' => out.push_str("$$"),
      _ => out.push(c),
    }
  }
  out
}

/// `target: \` followed by one dependency per line.
pub fn render_depfile(target: &str, deps: &[String]) -> String {
  let deps: Vec<String> = deps.iter().map(|d| escape(d)).collect();
  format!("{}: \\\n {}\n", escape(target), deps.join(" \\\n "))
}

pub fn write_depfile(path: &Path, target: &str, deps: &[String]) -> io::Result<()> {
  fs::write(path, render_depfile(target, deps))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn one_dependency_per_line() {
    let deps = vec!["Android.bp".to_string(), "dir with space/Android.bp".to_string()];
    assert_eq!(
      render_depfile("out/build.ninja", &deps),
      "out/build.ninja: \\\n Android.bp \\\n dir\\ with\\ space/Android.bp\n"
    );
  }

  #[test]
  fn writes_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("build.ninja.d");
    write_depfile(&path, "build.ninja", &["a/Android.bp".to_string()]).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "build.ninja: \\\n a/Android.bp\n");
  }
}
