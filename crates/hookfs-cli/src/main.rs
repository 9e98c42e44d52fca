//! hookfs binary.
//!
//! Runs Rhai scripts in one interpreter registered with a process-wide
//! virtual filesystem, so scripts can mount filesystems implemented in
//! Rhai and use them through the `file_*` host functions.
//!
//! Usage:
//!   # Mount the demo in-memory filesystem and use it
//!   hookfs demos/memfs.rhai -e 'vfs_filesystem("mount", "/mem", "memfs s"); file_mkdir("/mem/a")'
//!
//!   # Print results as JSON
//!   hookfs --json -e 'glob("/mem", "*")'

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use hookfs_core::{SharedVfs, Value, shared_vfs};
use hookfs_rhai::RhaiInterp;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::HookfsConfig;

/// Run Rhai scripts against a script-implemented virtual filesystem.
#[derive(Parser, Debug)]
#[command(name = "hookfs")]
#[command(about = "Run Rhai scripts against a script-implemented virtual filesystem")]
struct Args {
    /// Config file (default: ~/.config/hookfs/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initial working directory for relative paths
    #[arg(long)]
    cwd: Option<String>,

    /// Script to evaluate after the files
    #[arg(short = 'e', long = "eval")]
    eval: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Script files, evaluated in order
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("hookfs: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = HookfsConfig::load(args.config.as_deref())?;
    let vfs = shared_vfs();
    let interp = RhaiInterp::new(vfs.clone(), &config.engine);
    if let Some(cwd) = args.cwd.as_ref().or(config.cwd.as_ref()) {
        interp.set_cwd(cwd);
    }

    let outcome = run_scripts(&interp, &config, args);
    shutdown(&interp, &vfs);
    outcome
}

fn run_scripts(interp: &RhaiInterp, config: &HookfsConfig, args: &Args) -> Result<()> {
    for path in &config.preload {
        run_file(interp, path).context("preload")?;
    }
    for path in &args.files {
        let value = run_file(interp, path)?;
        print_value(&value, args.json)?;
    }
    if let Some(script) = &args.eval {
        let value = interp
            .run(script)
            .map_err(|e| anyhow!("{e}"))
            .context("evaluating -e script")?;
        print_value(&value, args.json)?;
    }
    Ok(())
}

fn run_file(interp: &RhaiInterp, path: &Path) -> Result<Value> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    tracing::debug!(path = %path.display(), "running script");
    interp
        .run(&source)
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("running {}", path.display()))
}

fn print_value(value: &Value, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(value)?);
    } else if !value.is_empty() {
        println!("{value}");
    }
    Ok(())
}

/// Tear down in the order the process exit would: the interpreter first,
/// so its mounts drain and close callbacks still run, then the registry.
fn shutdown(interp: &RhaiInterp, vfs: &SharedVfs) {
    interp.delete();
    vfs.begin_exit();
    tracing::debug!(mounts = vfs.list_mounts().len(), "shut down");
}
