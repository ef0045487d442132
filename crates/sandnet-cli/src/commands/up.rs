//! `snet up`: Bring the network up, wait for Ctrl+C, tear it down.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Context;
use clap::Args;
use sandnet_common::config::ShellBuiltins;
use sandnet_common::constants::APP_NAME;
use sandnet_core::helper::SystemRunner;
use sandnet_runtime::network::{Network, NodeReport};
use sandnet_service::quagga::QuaggaService;

use crate::output::{self, BOLD, DIM, GREEN, RESET};

/// Arguments for the `up` command.
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Path to the topology file.
    #[arg(default_value = "sandnet.yaml")]
    pub file: PathBuf,
}

/// Executes the `up` command.
///
/// Host checks run before anything is launched: the helper must be on the
/// `PATH`, the shell must list its builtins, and Quagga must be installed
/// when a topology uses it.
///
/// # Errors
///
/// Returns an error if a host check fails or bring-up fails. A failed
/// bring-up is torn down before returning.
pub fn execute(args: &UpArgs, helper: Option<PathBuf>) -> anyhow::Result<()> {
    let total_start = Instant::now();
    let mut topology = super::load_topology(&args.file, helper)?;

    topology.settings.helper = which::which(&topology.settings.helper).with_context(|| {
        format!(
            "namespace helper {} not found on PATH",
            topology.settings.helper.display()
        )
    })?;
    let builtins = ShellBuiltins::detect(&topology.settings.shell)?;
    topology.settings.builtins = builtins;
    if topology.uses_quagga() {
        QuaggaService::check_installed(&topology.settings.init_dir)?;
    }

    print_header();
    let mut network = topology.into_network(Arc::new(SystemRunner))?;
    let reports = match network.start() {
        Ok(reports) => reports,
        Err(e) => {
            tracing::error!(error = %e, "bring-up failed, tearing down");
            print_reports(&network.stop());
            return Err(e.into());
        }
    };

    eprintln!(
        "  {GREEN}{BOLD}Started {}{RESET} node(s) in {:.1}s:",
        network.nodes().count(),
        total_start.elapsed().as_secs_f64()
    );
    print_reports(&reports);

    wait_for_shutdown(&mut network)
}

fn print_header() {
    eprintln!();
    eprintln!("  {BOLD}{APP_NAME}{RESET} {DIM}v{}{RESET}", env!("CARGO_PKG_VERSION"));
    eprintln!();
}

fn print_reports(reports: &[NodeReport]) {
    for report in reports {
        eprintln!("    {}", output::report_line(report));
    }
}

fn wait_for_shutdown(network: &mut Network) -> anyhow::Result<()> {
    eprintln!();
    eprintln!("  Press {BOLD}Ctrl+C{RESET} to stop the network...");

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(250));
    }

    eprintln!();
    eprintln!("  Stopping network...");
    let reports = network.stop();
    print_reports(&reports);
    eprintln!("  {GREEN}All nodes stopped.{RESET}");
    Ok(())
}
