//! Typed descriptions of rules and build statements.

use std::collections::BTreeMap;
use std::fmt;

use crate::consts::PHONY_RULE;

/// Dependency file format understood by the build runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepsFormat {
  #[default]
  None,
  Gcc,
  Msvc,
}

impl DepsFormat {
  pub fn as_str(&self) -> Option<&'static str> {
    match self {
      DepsFormat::None => None,
      DepsFormat::Gcc => Some("gcc"),
      DepsFormat::Msvc => Some("msvc"),
    }
  }
}

/// Parallelism bucket a rule runs in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Pool {
  /// Exclusive access to the terminal.
  Console,
  /// Bounded by the number of CPUs of the machine writing the manifest.
  Local,
  Global { pkg: &'static str, name: String },
}

/// The template of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleParams {
  pub command: String,
  /// Implicit inputs of every build using the rule.
  pub command_deps: Vec<String>,
  pub command_order_only: Vec<String>,
  pub description: String,
  pub depfile: String,
  pub deps: DepsFormat,
  /// Outputs whose content did not change do not invalidate dependents.
  pub restat: bool,
  /// The rule rewrites the manifest itself.
  pub generator: bool,
  pub pool: Option<Pool>,
  pub rspfile: String,
  pub rspfile_content: String,
}

/// A rule handle returned by [`PackageContext::static_rule`](super::PackageContext::static_rule)
/// or [`ModuleContext::rule`](super::ModuleContext::rule).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rule {
  /// The build runner's built-in alias rule.
  Phony,
  Global { pkg: &'static str, name: String },
  /// A rule declared by one module, only usable by that module.
  Local(String),
}

impl fmt::Display for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Rule::Phony => f.write_str(PHONY_RULE),
      Rule::Global { pkg, name } => write!(f, "{}.{}", pkg, name),
      Rule::Local(name) => f.write_str(name),
    }
  }
}

/// One build statement as declared by a module.
///
/// Singular and plural fields are unioned, singular first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildParams {
  pub rule: Rule,
  pub description: String,
  pub output: String,
  pub outputs: Vec<String>,
  pub implicit_output: String,
  pub implicit_outputs: Vec<String>,
  /// Outputs that are symlinks; each must also be an output or implicit output.
  pub symlink_output: String,
  pub symlink_outputs: Vec<String>,
  pub input: String,
  pub inputs: Vec<String>,
  pub implicit: String,
  pub implicits: Vec<String>,
  pub order_only: Vec<String>,
  pub validation: String,
  pub validations: Vec<String>,
  pub depfile: String,
  pub deps: DepsFormat,
  /// Build this statement when the runner is invoked without targets.
  pub default: bool,
  pub args: BTreeMap<String, String>,
}

impl Default for BuildParams {
  fn default() -> Self {
    Self {
      rule: Rule::Phony,
      description: String::new(),
      output: String::new(),
      outputs: Vec::new(),
      implicit_output: String::new(),
      implicit_outputs: Vec::new(),
      symlink_output: String::new(),
      symlink_outputs: Vec::new(),
      input: String::new(),
      inputs: Vec::new(),
      implicit: String::new(),
      implicits: Vec::new(),
      order_only: Vec::new(),
      validation: String::new(),
      validations: Vec::new(),
      depfile: String::new(),
      deps: DepsFormat::None,
      default: false,
      args: BTreeMap::new(),
    }
  }
}

fn join(single: &str, many: &[String]) -> Vec<String> {
  let mut out = Vec::with_capacity(many.len() + 1);
  if !single.is_empty() {
    out.push(single.to_string());
  }
  out.extend(many.iter().filter(|s| !s.is_empty()).cloned());
  out
}

impl BuildParams {
  pub fn all_outputs(&self) -> Vec<String> {
    join(&self.output, &self.outputs)
  }

  pub fn all_implicit_outputs(&self) -> Vec<String> {
    join(&self.implicit_output, &self.implicit_outputs)
  }

  pub fn all_symlink_outputs(&self) -> Vec<String> {
    join(&self.symlink_output, &self.symlink_outputs)
  }

  pub fn all_inputs(&self) -> Vec<String> {
    join(&self.input, &self.inputs)
  }

  pub fn all_implicits(&self) -> Vec<String> {
    join(&self.implicit, &self.implicits)
  }

  pub fn all_validations(&self) -> Vec<String> {
    join(&self.validation, &self.validations)
  }

  /// Check the shape of the statement, independent of any scope.
  pub fn validate(&self) -> Result<(), String> {
    let outputs = self.all_outputs();
    let implicit_outputs = self.all_implicit_outputs();
    if outputs.is_empty() && implicit_outputs.is_empty() {
      return Err("build statement has no outputs".to_string());
    }
    let paths = [
      ("output", &outputs),
      ("implicit output", &implicit_outputs),
      ("symlink output", &self.all_symlink_outputs()),
      ("input", &self.all_inputs()),
      ("implicit", &self.all_implicits()),
      ("order-only input", &self.order_only),
      ("validation", &self.all_validations()),
    ];
    for (what, list) in paths {
      if let Some(path) = list.iter().find(|p| p.contains('\n')) {
        return Err(format!("{} {:?} contains a newline", what, path));
      }
    }
    for (what, value) in [("description", &self.description), ("depfile", &self.depfile)] {
      if value.contains('\n') {
        return Err(format!("{} {:?} contains a newline", what, value));
      }
    }
    if let Some((key, value)) = self.args.iter().find(|(_, v)| v.contains('\n')) {
      return Err(format!("argument {:?} value {:?} contains a newline", key, value));
    }
    for symlink in self.all_symlink_outputs() {
      if !outputs.contains(&symlink) && !implicit_outputs.contains(&symlink) {
        return Err(format!(
          "symlink output {:?} is not an output or implicit output of this build statement",
          symlink
        ));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn singular_and_plural_are_unioned() {
    let params = BuildParams {
      output: "out/a".to_string(),
      outputs: vec!["out/b".to_string()],
      input: "src/a".to_string(),
      ..Default::default()
    };
    assert_eq!(params.all_outputs(), vec!["out/a", "out/b"]);
    assert_eq!(params.all_inputs(), vec!["src/a"]);
    assert!(params.all_implicits().is_empty());
  }

  #[test]
  fn symlink_outputs_must_be_outputs() {
    let mut params = BuildParams {
      output: "out/link".to_string(),
      symlink_output: "out/link".to_string(),
      ..Default::default()
    };
    assert!(params.validate().is_ok());

    params.symlink_outputs = vec!["out/other".to_string()];
    assert_eq!(
      params.validate().unwrap_err(),
      "symlink output \"out/other\" is not an output or implicit output of this build statement"
    );
  }

  #[test]
  fn statements_need_outputs() {
    assert!(BuildParams::default().validate().is_err());
  }

  #[test]
  fn newlines_are_rejected_in_paths_and_values() {
    let params = BuildParams {
      output: "out/a".to_string(),
      implicits: vec!["src/b\nbuild evil: phony".to_string()],
      ..Default::default()
    };
    assert_eq!(
      params.validate().unwrap_err(),
      "implicit \"src/b\\nbuild evil: phony\" contains a newline"
    );

    let mut params = BuildParams {
      output: "out/a".to_string(),
      ..Default::default()
    };
    params.args.insert("cmd".to_string(), "touch $out\nrm -rf /tmp/x".to_string());
    assert_eq!(
      params.validate().unwrap_err(),
      "argument \"cmd\" value \"touch $out\\nrm -rf /tmp/x\" contains a newline"
    );

    let params = BuildParams {
      output: "out/a".to_string(),
      description: "line one\nline two".to_string(),
      ..Default::default()
    };
    assert!(params.validate().unwrap_err().starts_with("description"));
  }
}
