//! One orchestrator run: read the build file list, run the context and
//! write the manifest, its dep file and the optional JSON dumps.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Serialize;
use tracing::{debug, info};

use blueprint_lib::config::ProductVariables;
use blueprint_lib::ninja::write_depfile;
use blueprint_lib::{Config, Context, RunOutput, parse_file_list};

use crate::output::{format_duration, print_success, print_warning};

/// Resolved command line options.
#[derive(Debug)]
pub struct RunOptions {
  pub list_file: PathBuf,
  pub manifest: PathBuf,
  pub top: PathBuf,
  pub out_dir: String,
  pub soong_variables: Option<PathBuf>,
  pub allow_missing_dependencies: bool,
  pub empty_ninja_file: bool,
  pub trace: Option<PathBuf>,
  pub module_graph: Option<PathBuf>,
  pub sysroot: Option<String>,
}

pub fn cmd_run(opts: &RunOptions) -> Result<()> {
  let top = dunce::canonicalize(&opts.top).with_context(|| format!("Failed to resolve --top {}", opts.top.display()))?;
  debug!(top = %top.display(), "source root");

  let mut config = Config::new(&top, opts.out_dir.clone());
  config.sysroot = opts.sysroot.clone();
  if let Some(sysroot) = &config.sysroot {
    debug!(sysroot = %sysroot, "consumed SYSROOT");
  }
  if let Some(path) = &opts.soong_variables {
    let vars = ProductVariables::load(path)?;
    config.apply_product_variables(vars)?;
  }
  if opts.allow_missing_dependencies {
    config.allow_missing_dependencies = true;
  }

  let list = fs::read_to_string(&opts.list_file)
    .with_context(|| format!("Failed to read build file list {}", opts.list_file.display()))?;
  let build_files = parse_file_list(&list)?;
  info!(count = build_files.len(), "build files listed");

  let output = Context::new().run(&config, &build_files)?;
  for warning in &output.warnings {
    print_warning(&warning.to_string());
  }

  write_outputs(opts, &output)?;

  if let Some(path) = &opts.trace {
    write_json(path, &output.stages)?;
  }
  if let Some(path) = &opts.module_graph {
    write_json(path, &output.graph.dump())?;
  }

  for stage in &output.stages {
    debug!(stage = %stage.stage, took = %format_duration(stage.duration), "stage");
  }
  let total = output.stages.iter().map(|s| s.duration).sum();
  print_success(&format!(
    "Wrote {} ({})",
    opts.manifest.display(),
    format_duration(total)
  ));
  Ok(())
}

fn write_outputs(opts: &RunOptions, output: &RunOutput) -> Result<()> {
  if let Some(parent) = opts.manifest.parent()
    && !parent.as_os_str().is_empty()
  {
    fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {}", parent.display()))?;
  }

  let contents = if opts.empty_ninja_file { "" } else { output.manifest.as_str() };
  fs::write(&opts.manifest, contents)
    .with_context(|| format!("Failed to write manifest {}", opts.manifest.display()))?;

  let mut deps = vec![opts.list_file.display().to_string()];
  deps.extend(output.deps.iter().cloned());
  let depfile = depfile_path(&opts.manifest);
  write_depfile(&depfile, &opts.manifest.display().to_string(), &deps)
    .with_context(|| format!("Failed to write dep file {}", depfile.display()))?;
  debug!(deps = deps.len(), path = %depfile.display(), "wrote dep file");
  Ok(())
}

/// `<manifest>.d`, next to the manifest.
pub fn depfile_path(manifest: &Path) -> PathBuf {
  let mut name = manifest.as_os_str().to_owned();
  name.push(".d");
  PathBuf::from(name)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
