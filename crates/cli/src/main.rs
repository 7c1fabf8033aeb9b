mod output;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use blueprint_lib::{BlueprintError, take_sysroot};

use output::print_error;
use run::{RunOptions, cmd_run};

/// blueprint - turn build definition files into a Ninja manifest
#[derive(Parser)]
#[command(name = "blueprint")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// File listing every build file, one path per line, relative to --top
  #[arg(short = 'l', value_name = "FILE")]
  list_file: PathBuf,

  /// Manifest output path (default: <out>/soong/build.ninja)
  #[arg(short = 'o', value_name = "FILE")]
  output: Option<PathBuf>,

  /// Do the full run but write a zero-byte manifest
  #[arg(long)]
  empty_ninja_file: bool,

  /// Accepted for compatibility; there is no collector to tune
  #[arg(long)]
  no_gc: bool,

  /// Accepted for compatibility; CPU profiles are not collected
  #[arg(long, value_name = "FILE")]
  cpuprofile: Option<PathBuf>,

  /// Accepted for compatibility; memory profiles are not collected
  #[arg(long, value_name = "FILE")]
  memprofile: Option<PathBuf>,

  /// Write per-stage durations as JSON
  #[arg(long, value_name = "FILE")]
  trace: Option<PathBuf>,

  /// Source root the build file paths are relative to
  #[arg(long, value_name = "DIR", default_value = ".")]
  top: PathBuf,

  /// Output directory, relative to the source root
  #[arg(long = "out", value_name = "DIR", default_value = "out")]
  out_dir: String,

  /// Product variables JSON file
  #[arg(long, value_name = "FILE")]
  soong_variables: Option<PathBuf>,

  /// Turn missing dependencies into build-time error actions
  #[arg(long)]
  allow_missing_dependencies: bool,

  /// Write the module graph as JSON
  #[arg(long, value_name = "FILE")]
  module_graph: Option<PathBuf>,

  /// Enable verbose output
  #[arg(short, long)]
  verbose: bool,
}

fn main() -> ExitCode {
  // SAFETY: no other threads exist yet.
  let sysroot = unsafe { take_sysroot() };

  // usage errors exit 1 like every other failure
  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(err) => {
      let _ = err.print();
      return if err.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
    }
  };

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if cli.no_gc {
    info!("--no-gc has no effect");
  }
  for (flag, path) in [("--cpuprofile", &cli.cpuprofile), ("--memprofile", &cli.memprofile)] {
    if let Some(path) = path {
      info!(path = %path.display(), "{} is not supported, no profile written", flag);
    }
  }

  let manifest = cli
    .output
    .unwrap_or_else(|| PathBuf::from(format!("{}/soong/build.ninja", cli.out_dir)));
  let opts = RunOptions {
    list_file: cli.list_file,
    manifest,
    top: cli.top,
    out_dir: cli.out_dir,
    soong_variables: cli.soong_variables,
    allow_missing_dependencies: cli.allow_missing_dependencies,
    empty_ninja_file: cli.empty_ninja_file,
    trace: cli.trace,
    module_graph: cli.module_graph,
    sysroot,
  };

  match cmd_run(&opts) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      report(&err);
      ExitCode::FAILURE
    }
  }
}

fn report(err: &anyhow::Error) {
  match err.downcast_ref::<BlueprintError>() {
    Some(BlueprintError::Diagnostics(diags)) => {
      for diag in diags {
        print_error(&diag.to_string());
      }
    }
    _ => print_error(&format!("{:#}", err)),
  }
}
