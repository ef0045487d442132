//! CLI command definitions and dispatch.

pub mod check;
pub mod up;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sandnet_runtime::topology::Topology;

/// sandnet: lightweight network emulation with namespace-isolated nodes.
#[derive(Parser, Debug)]
#[command(name = sandnet_common::constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Namespace-entry helper, overriding the topology settings.
    #[arg(long, global = true, env = "SANDNET_HELPER")]
    pub helper: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a topology and show what bring-up would do.
    Check(check::CheckArgs),
    /// Bring the network up and keep it running until Ctrl+C.
    Up(up::UpArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Check(args) => check::execute(&args, cli.helper),
        Command::Up(args) => up::execute(&args, cli.helper),
    }
}

/// Loads `file` and applies the `--helper` override.
fn load_topology(file: &Path, helper: Option<PathBuf>) -> anyhow::Result<Topology> {
    let mut topology = Topology::load(file)
        .with_context(|| format!("failed to load topology {}", file.display()))?;
    if let Some(helper) = helper {
        topology.settings.helper = helper;
    }
    Ok(topology)
}
