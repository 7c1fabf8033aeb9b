//! `genrule`: run a shell command that turns sources into generated files.

mod command;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use tracing::debug;

use crate::build::{BuildParams, DepsFormat, ModuleContext, OUTPUT_FILES, OutputFiles, PackageContext, Rule, RuleParams};
use crate::graph::{MutatorContext, Variation};
use crate::module::{ArchSupport, Module, ModuleBase};
use crate::mutators::TOOL_TAG;
use crate::property_struct;
use crate::proptools::PropertyStruct;

use command::{CommandError, Resolver, expand};

struct GenruleRules {
  pctx: PackageContext,
  generate: Rule,
}

static RULES: LazyLock<GenruleRules> = LazyLock::new(|| {
  let mut pctx = PackageContext::new("genrule");
  let generate = pctx.static_rule(
    "generate",
    RuleParams {
      command: "$cmd".to_string(),
      description: "generate $out".to_string(),
      restat: true,
      ..Default::default()
    },
    &["cmd"],
  );
  GenruleRules { pctx, generate }
});

property_struct! {
  pub struct GenruleProperties {
    /// Files the command reads besides its sources, such as scripts.
    pub tool_files: Vec<String> => [path],

    /// Host modules whose output is run by the command.
    pub tools: Vec<String>,

    /// The command, with `$(in)`, `$(out)`, `$(genDir)`, `$(depfile)`,
    /// `$(location LABEL)` and `$(locations LABEL)` expanded.
    pub cmd: Option<String>,

    /// The command writes a gcc-style dep file to `$(depfile)`.
    pub depfile: Option<bool>,

    pub srcs: Vec<String> => [arch_variant, path],

    pub exclude_srcs: Vec<String> => [arch_variant, path],

    /// Output file names, relative to the generated directory.
    pub out: Vec<String> => [arch_variant],
  }
}

#[derive(Debug, Clone)]
pub struct Genrule {
  base: ModuleBase,
  pub props: GenruleProperties,
}

impl Genrule {
  pub fn new() -> Self {
    Self {
      base: ModuleBase::new(ArchSupport::HostAndDevice),
      props: GenruleProperties::default(),
    }
  }
}

impl Default for Genrule {
  fn default() -> Self {
    Self::new()
  }
}

/// Values of the command variables for one variant.
struct Expansion {
  inputs: Vec<String>,
  outputs: Vec<String>,
  gen_dir: String,
  depfile: Option<String>,
  /// Files per label, tools first, then tool files, then sources.
  labels: Vec<(String, Vec<String>)>,
  tool_count: usize,
}

impl Expansion {
  fn label(&self, label: &str) -> Result<&[String], CommandError> {
    self
      .labels
      .iter()
      .find(|(l, _)| l == label)
      .map(|(_, files)| files.as_slice())
      .ok_or_else(|| CommandError::UnknownLabel(label.to_string()))
  }
}

impl Resolver for Expansion {
  fn resolve(&self, name: &str, arg: Option<&str>) -> Result<String, CommandError> {
    match (name, arg) {
      ("in", None) => Ok(self.inputs.join(" ")),
      ("out", None) => Ok(self.outputs.join(" ")),
      ("genDir", None) => Ok(self.gen_dir.clone()),
      ("depfile", None) => self.depfile.clone().ok_or(CommandError::NoDepfile),
      ("location", None) => {
        if self.tool_count == 0 {
          return Err(CommandError::NoTools);
        }
        let (label, files) = &self.labels[0];
        files.first().cloned().ok_or_else(|| CommandError::NoFiles(label.clone()))
      }
      ("location", Some(label)) => match self.label(label)? {
        [one] => Ok(one.clone()),
        [] => Err(CommandError::NoFiles(label.to_string())),
        _ => Err(CommandError::MultipleFiles(label.to_string())),
      },
      ("locations", Some(label)) => Ok(self.label(label)?.join(" ")),
      _ => Err(CommandError::UnknownVar(match arg {
        Some(arg) => format!("{} {}", name, arg),
        None => name.to_string(),
      })),
    }
  }
}

fn valid_output(name: &str) -> bool {
  !name.is_empty() && !name.starts_with('/') && !name.split('/').any(|p| p == ".." || p == ".")
}

impl Module for Genrule {
  crate::module_accessors!();

  fn property_roots(&self) -> Vec<&dyn PropertyStruct> {
    vec![&self.base.common, &self.props]
  }

  fn property_roots_mut(&mut self) -> Vec<&mut dyn PropertyStruct> {
    vec![&mut self.base.common, &mut self.props]
  }

  fn dependencies(&self, ctx: &mut MutatorContext<'_>) {
    let host = ctx.config().build_os_target().variation();
    for tool in &self.props.tools {
      ctx.add_far_variation_dependency(TOOL_TAG, &[Variation::new("arch", host.as_str())], tool);
    }
  }

  fn generate_build_actions(&mut self, ctx: &mut ModuleContext<'_>) {
    let Some(cmd) = self.props.cmd.clone() else {
      ctx.property_errorf("cmd", "missing cmd");
      return;
    };
    if self.props.out.is_empty() {
      ctx.property_errorf("out", "must have at least one output file");
      return;
    }
    if let Some(bad) = self.props.out.iter().find(|o| !valid_output(o)) {
      ctx.property_errorf("out", format!("invalid output path {:?}", bad));
      return;
    }

    let mut labels: Vec<(String, Vec<String>)> = Vec::new();
    let mut implicits = Vec::new();
    let mut tool_names = Vec::new();
    ctx.visit_direct_deps_if(|dep| dep.tag() == TOOL_TAG, |dep| tool_names.push((dep.name(), dep.provider(&OUTPUT_FILES))));
    for (name, files) in tool_names {
      match files.and_then(|f| f.default.first()) {
        Some(path) => {
          implicits.push(path.clone());
          labels.push((name.to_string(), vec![path.clone()]));
        }
        None => ctx.property_errorf("tools", format!("module {:?} does not produce a tool", name)),
      }
    }
    for tool_file in &self.props.tool_files {
      let files = ctx.expand_sources("tool_files", std::slice::from_ref(tool_file), &[]);
      implicits.extend(files.iter().cloned());
      labels.push((tool_file.clone(), files));
    }
    let tool_count = labels.len();

    let mut inputs = Vec::new();
    for src in &self.props.srcs {
      let files = ctx.expand_sources("srcs", std::slice::from_ref(src), &self.props.exclude_srcs);
      inputs.extend(files.iter().cloned());
      labels.push((src.clone(), files));
    }

    let gen_dir = ctx.gen_dir();
    let outputs: Vec<String> = self.props.out.iter().map(|o| format!("{}/{}", gen_dir, o)).collect();
    let depfile = self
      .props
      .depfile
      .unwrap_or(false)
      .then(|| format!("{}.d", outputs[0]));
    let expansion = Expansion {
      inputs,
      outputs,
      gen_dir,
      depfile,
      labels,
      tool_count,
    };

    let command = match expand(&cmd, &expansion) {
      Ok(command) => command,
      Err(err) => {
        ctx.property_errorf("cmd", err.to_string());
        return;
      }
    };
    if ctx.failed() {
      return;
    }
    debug!(module = ctx.module_name(), outputs = expansion.outputs.len(), "generating");

    let Expansion {
      inputs,
      outputs,
      depfile,
      ..
    } = expansion;
    let tagged = self
      .props
      .out
      .iter()
      .zip(&outputs)
      .map(|(name, path)| (name.clone(), vec![path.clone()]))
      .collect();
    ctx.build(
      &RULES.pctx,
      BuildParams {
        rule: RULES.generate.clone(),
        outputs: outputs.clone(),
        inputs,
        implicits,
        deps: if depfile.is_some() { DepsFormat::Gcc } else { DepsFormat::None },
        depfile: depfile.unwrap_or_default(),
        args: BTreeMap::from([("cmd".to_string(), command.replace('$', "$$"))]),
        ..Default::default()
      },
    );
    ctx.set_provider(&OUTPUT_FILES, OutputFiles { default: outputs, tagged });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn expansion() -> Expansion {
    Expansion {
      inputs: vec!["a/x.in".to_string(), "a/y.in".to_string()],
      outputs: vec!["gen/x.h".to_string()],
      gen_dir: "gen".to_string(),
      depfile: None,
      labels: vec![
        ("tool".to_string(), vec!["host/bin/tool".to_string()]),
        ("x.in".to_string(), vec!["a/x.in".to_string()]),
        (":srcs".to_string(), vec!["a/y.in".to_string(), "a/z.in".to_string()]),
      ],
      tool_count: 1,
    }
  }

  #[test]
  fn expands_locations() {
    let e = expansion();
    assert_eq!(
      expand("$(location) -o $(out) $(in)", &e).unwrap(),
      "host/bin/tool -o gen/x.h a/x.in a/y.in"
    );
    assert_eq!(expand("$(location x.in)", &e).unwrap(), "a/x.in");
    assert_eq!(expand("$(locations :srcs)", &e).unwrap(), "a/y.in a/z.in");
    assert_eq!(
      expand("$(location :srcs)", &e).unwrap_err().to_string(),
      "label \":srcs\" has multiple files, use $(locations :srcs) to reference it"
    );
    assert_eq!(
      expand("$(location nope)", &e).unwrap_err(),
      CommandError::UnknownLabel("nope".to_string())
    );
    assert_eq!(expand("$(depfile)", &e).unwrap_err(), CommandError::NoDepfile);
  }

  #[test]
  fn output_names() {
    assert!(valid_output("x.h"));
    assert!(valid_output("sub/x.h"));
    assert!(!valid_output("../x.h"));
    assert!(!valid_output("/abs"));
  }
}
