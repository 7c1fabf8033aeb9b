//! Filesystem access for build-file reads and source globs.
//!
//! All paths are relative to the source root. [`OsFs`] reads the real tree
//! under a root directory; [`MockFs`] serves an in-memory tree for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
  case_sensitive: true,
  require_literal_separator: true,
  require_literal_leading_dot: true,
};

/// Result of a glob: sorted matching files and every directory that was listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobResult {
  pub matches: Vec<String>,
  pub dirs: Vec<String>,
}

pub trait FileSystem: Send + Sync + fmt::Debug {
  fn read_to_string(&self, path: &str) -> io::Result<String>;

  fn exists(&self, path: &str) -> bool;

  fn is_dir(&self, path: &str) -> bool;

  /// Expand `pattern`, dropping files matched by any of `excludes`.
  fn glob(&self, pattern: &str, excludes: &[String]) -> io::Result<GlobResult>;
}

/// Is `s` a glob pattern rather than a literal path
pub fn is_glob(s: &str) -> bool {
  s.contains(['*', '?', '['])
}

/// Split `pattern` into its literal directory prefix and the wildcard rest.
fn split_static_prefix(pattern: &str) -> (&str, &str) {
  let mut end = 0;
  for (idx, component) in pattern.split('/').enumerate() {
    if is_glob(component) {
      break;
    }
    if idx > 0 {
      end += 1;
    }
    end += component.len();
  }
  // the last literal component is a file name, not a directory
  match pattern[..end].rfind('/') {
    Some(_) if end < pattern.len() => (&pattern[..end], &pattern[end + 1..]),
    Some(slash) => (&pattern[..slash], &pattern[slash + 1..]),
    None if end < pattern.len() && end > 0 => (&pattern[..end], &pattern[end + 1..]),
    None => ("", pattern),
  }
}

fn compile(pattern: &str) -> io::Result<Pattern> {
  Pattern::new(pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{pattern}: {}", e.msg)))
}

fn compile_excludes(excludes: &[String]) -> io::Result<Vec<Pattern>> {
  excludes.iter().map(|e| compile(e)).collect()
}

fn excluded(path: &str, excludes: &[Pattern]) -> bool {
  excludes.iter().any(|e| e.matches_with(path, MATCH_OPTIONS))
}

fn to_slash(path: &Path) -> String {
  path
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

/// The real filesystem, rooted at the source tree.
#[derive(Debug, Clone)]
pub struct OsFs {
  root: PathBuf,
}

impl OsFs {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn abs(&self, path: &str) -> PathBuf {
    self.root.join(path)
  }
}

impl FileSystem for OsFs {
  fn read_to_string(&self, path: &str) -> io::Result<String> {
    std::fs::read_to_string(self.abs(path))
  }

  fn exists(&self, path: &str) -> bool {
    self.abs(path).exists()
  }

  fn is_dir(&self, path: &str) -> bool {
    self.abs(path).is_dir()
  }

  fn glob(&self, pattern: &str, excludes: &[String]) -> io::Result<GlobResult> {
    let matcher = compile(pattern)?;
    let excludes = compile_excludes(excludes)?;
    let (prefix, rest) = split_static_prefix(pattern);
    let base = self.abs(prefix);

    let mut result = GlobResult::default();
    if !base.is_dir() {
      result.dirs.push(prefix.to_string());
      return Ok(result);
    }

    let mut walker = WalkDir::new(&base).follow_links(true).sort_by_file_name();
    if !rest.contains("**") {
      walker = walker.max_depth(rest.split('/').count());
    }
    for entry in walker {
      let entry = entry.map_err(io::Error::other)?;
      let rel = match entry.path().strip_prefix(&self.root) {
        Ok(rel) => to_slash(rel),
        Err(_) => continue,
      };
      if entry.file_type().is_dir() {
        result.dirs.push(rel);
      } else if matcher.matches_with(&rel, MATCH_OPTIONS) && !excluded(&rel, &excludes) {
        result.matches.push(rel);
      }
    }
    result.matches.sort();
    Ok(result)
  }
}

/// In-memory filesystem keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
  files: BTreeMap<String, String>,
}

impl MockFs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
    self.add_file(path, contents);
    self
  }

  pub fn add_file(&mut self, path: impl Into<String>, contents: impl Into<String>) {
    self.files.insert(path.into(), contents.into());
  }

  fn dirs(&self) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    for path in self.files.keys() {
      let mut current = path.as_str();
      while let Some(slash) = current.rfind('/') {
        current = &current[..slash];
        dirs.insert(current.to_string());
      }
      dirs.insert(String::new());
    }
    dirs
  }
}

impl FileSystem for MockFs {
  fn read_to_string(&self, path: &str) -> io::Result<String> {
    self
      .files
      .get(path)
      .cloned()
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{path}: no such file")))
  }

  fn exists(&self, path: &str) -> bool {
    self.files.contains_key(path) || self.is_dir(path)
  }

  fn is_dir(&self, path: &str) -> bool {
    self.dirs().contains(path)
  }

  fn glob(&self, pattern: &str, excludes: &[String]) -> io::Result<GlobResult> {
    let matcher = compile(pattern)?;
    let excludes = compile_excludes(excludes)?;
    let (prefix, _) = split_static_prefix(pattern);
    let under = |p: &str| prefix.is_empty() || p == prefix || p.starts_with(&format!("{prefix}/"));

    let matches = self
      .files
      .keys()
      .filter(|p| under(p.as_str()) && matcher.matches_with(p, MATCH_OPTIONS) && !excluded(p, &excludes))
      .cloned()
      .collect();
    let mut dirs: Vec<String> = self.dirs().into_iter().filter(|d| under(d.as_str())).collect();
    if dirs.is_empty() {
      dirs.push(prefix.to_string());
    }
    Ok(GlobResult { matches, dirs })
  }
}
