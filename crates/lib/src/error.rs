//! Diagnostics and top-level errors.
//!
//! Every problem found while reading build files, running mutators or
//! generating actions becomes a [`Diagnostic`]. Phases collect diagnostics
//! and the orchestrator stops at the next stage boundary once any have been
//! reported. [`BlueprintError`] wraps the collected list together with the
//! I/O failures that can happen around the core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::parser::{ParseError, Pos};
use crate::proptools::PropertyError;

/// Classification of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
  /// Build file could not be parsed.
  Parse,
  /// A property value could not be bound or merged.
  Property,
  /// A module is invalid as a whole.
  Module,
  /// An invariant of the core was violated.
  Internal,
  /// Bad command line usage.
  User,
  /// Reading or writing a file failed.
  Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
  Warning,
  Error,
  Fatal,
}

/// A positioned error report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
  pub kind: DiagnosticKind,
  pub severity: Severity,
  pub pos: Option<Pos>,
  pub module: Option<String>,
  pub variant: Option<String>,
  pub property: Option<String>,
  pub message: String,
}

impl Diagnostic {
  fn new(kind: DiagnosticKind, pos: Option<Pos>, message: impl Into<String>) -> Self {
    Self {
      kind,
      severity: Severity::Error,
      pos,
      module: None,
      variant: None,
      property: None,
      message: message.into(),
    }
  }

  pub fn property(pos: Pos, property: impl Into<String>, message: impl Into<String>) -> Self {
    let mut diag = Self::new(DiagnosticKind::Property, Some(pos), message);
    let property = property.into();
    if !property.is_empty() {
      diag.property = Some(property);
    }
    diag
  }

  pub fn module(pos: Pos, message: impl Into<String>) -> Self {
    Self::new(DiagnosticKind::Module, Some(pos), message)
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::new(DiagnosticKind::Internal, None, message)
  }

  pub fn user(message: impl Into<String>) -> Self {
    Self::new(DiagnosticKind::User, None, message)
  }

  pub fn io(path: impl fmt::Display, err: impl fmt::Display) -> Self {
    Self::new(DiagnosticKind::Io, None, format!("{}: {}", path, err))
  }

  pub fn at(mut self, pos: Pos) -> Self {
    self.pos = Some(pos);
    self
  }

  /// Attribute the diagnostic to a module variant.
  pub fn in_module(mut self, name: impl Into<String>, variant: impl Into<String>) -> Self {
    self.module = Some(name.into());
    let variant = variant.into();
    self.variant = if variant.is_empty() { None } else { Some(variant) };
    self
  }

  pub fn fatal(mut self) -> Self {
    self.severity = Severity::Fatal;
    self
  }

  pub fn warning(mut self) -> Self {
    self.severity = Severity::Warning;
    self
  }

  pub fn is_error(&self) -> bool {
    self.severity >= Severity::Error
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(pos) = &self.pos
      && !pos.is_synthetic()
    {
      write!(f, "{}: ", pos)?;
    }
    if let Some(module) = &self.module {
      write!(f, "module {:?}", module)?;
      if let Some(variant) = &self.variant {
        write!(f, " variant {:?}", variant)?;
      }
      f.write_str(": ")?;
    }
    if let Some(property) = &self.property {
      write!(f, "{}: ", property)?;
    }
    match self.kind {
      DiagnosticKind::Internal => write!(f, "internal error: {} (please report this)", self.message),
      _ => f.write_str(&self.message),
    }
  }
}

impl From<ParseError> for Diagnostic {
  fn from(err: ParseError) -> Self {
    Self::new(DiagnosticKind::Parse, Some(err.pos), err.err)
  }
}

impl From<PropertyError> for Diagnostic {
  fn from(err: PropertyError) -> Self {
    match err {
      PropertyError::Unsupported { pos, message, .. } => Self::new(DiagnosticKind::Property, Some(pos), message).fatal(),
      PropertyError::Invalid { pos, message, .. } => Self::new(DiagnosticKind::Property, Some(pos), message),
      PropertyError::Internal(message) => Self::internal(message),
    }
  }
}

/// Renders a list of diagnostics one per line.
pub struct DiagnosticList<'a>(pub &'a [Diagnostic]);

impl fmt::Display for DiagnosticList<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, diag) in self.0.iter().enumerate() {
      if i > 0 {
        f.write_str("\n")?;
      }
      write!(f, "{}", diag)?;
    }
    Ok(())
  }
}

/// Errors returned by the orchestration entry points.
#[derive(Debug, Error)]
pub enum BlueprintError {
  /// One or more diagnostics were reported.
  #[error("{}", DiagnosticList(.0))]
  Diagnostics(Vec<Diagnostic>),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("configuration error: {0}")]
  Config(#[from] crate::config::ConfigError),

  #[error("JSON serialization error: {0}")]
  Json(#[from] serde_json::Error),
}

impl BlueprintError {
  /// The diagnostics carried by this error, synthesizing one for I/O failures.
  pub fn diagnostics(&self) -> Vec<Diagnostic> {
    match self {
      BlueprintError::Diagnostics(diags) => diags.clone(),
      BlueprintError::Read { path, source } | BlueprintError::Write { path, source } => {
        vec![Diagnostic::io(path.display(), source)]
      }
      other => vec![Diagnostic::user(other.to_string())],
    }
  }
}

impl From<Vec<Diagnostic>> for BlueprintError {
  fn from(diags: Vec<Diagnostic>) -> Self {
    BlueprintError::Diagnostics(diags)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pos() -> Pos {
    Pos::new("a/Android.bp", 3, 1)
  }

  #[test]
  fn module_property_rendering() {
    let diag = Diagnostic::property(pos(), "srcs", "can't assign string value to list property \"srcs\"")
      .in_module("libfoo", "android_arm64");
    assert_eq!(
      diag.to_string(),
      "a/Android.bp:3:1: module \"libfoo\" variant \"android_arm64\": srcs: can't assign string value to list property \"srcs\""
    );
  }

  #[test]
  fn internal_errors_ask_for_a_report() {
    let diag = Diagnostic::internal("provider set twice").in_module("m", "");
    assert_eq!(
      diag.to_string(),
      "module \"m\": internal error: provider set twice (please report this)"
    );
  }

  #[test]
  fn parse_errors_convert() {
    let diag: Diagnostic = ParseError::new(pos(), "unexpected character '#'").into();
    assert_eq!(diag.kind, DiagnosticKind::Parse);
    assert_eq!(diag.to_string(), "a/Android.bp:3:1: unexpected character '#'");
  }
}
