//! `snet check`: Validate a topology and display the bring-up plan.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use sandnet_core::helper::SystemRunner;

use crate::output;

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the topology file.
    #[arg(default_value = "sandnet.yaml")]
    pub file: PathBuf,

    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `check` command.
///
/// Builds the network, which validates namespaces, hostnames and service
/// parameters, then prints the plan without starting any shell.
///
/// # Errors
///
/// Returns an error if the topology cannot be loaded or is invalid.
pub fn execute(args: &CheckArgs, helper: Option<PathBuf>) -> anyhow::Result<()> {
    let topology = super::load_topology(&args.file, helper)?;
    let network = topology.into_network(Arc::new(SystemRunner))?;
    let plan = network.plan();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Bring-up plan for: {}", args.file.display());
    println!();
    for node in &plan {
        for line in output::plan_lines(node) {
            println!("{line}");
        }
    }
    println!();
    println!("  {} node(s), {} service(s).", plan.len(), network.services().len());
    Ok(())
}
