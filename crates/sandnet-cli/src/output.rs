//! Formatted output helpers for CLI commands.
//!
//! Terminal escapes live here so commands share one look.

use sandnet_runtime::network::{NodePlan, NodeReport};

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const RESET: &str = "\x1b[0m";

/// One line per node: its name, then each service with a colored marker.
#[must_use]
pub fn report_line(report: &NodeReport) -> String {
    let services: Vec<String> = report
        .services
        .iter()
        .map(|s| {
            let (color, marker) = if s.succeeded() { (GREEN, "OK") } else { (RED, "FAIL") };
            format!("{} {color}{marker}{RESET}", s.service)
        })
        .collect();
    format!("{BOLD}{}{RESET}  {}", report.node, services.join(", "))
}

/// Human-readable plan entry for one node.
#[must_use]
pub fn plan_lines(plan: &NodePlan) -> Vec<String> {
    let mut lines = vec![format!("  + {}", plan.name)];
    let namespaces = if plan.namespaces.is_empty() {
        "none".to_owned()
    } else {
        plan.namespaces.join(",")
    };
    lines.push(format!("      namespaces: {namespaces}"));
    lines.push(format!("      launch: {DIM}{}{RESET}", plan.launch.join(" ")));
    if let Some(dir) = &plan.private_log_dir {
        lines.push(format!("      private logs: {}", dir.display()));
    }
    if let Some(dir) = &plan.private_run_dir {
        lines.push(format!("      private run: {}", dir.display()));
    }
    if plan.private_mounts > 0 {
        lines.push(format!("      private mounts: {}", plan.private_mounts));
    }
    if !plan.services.is_empty() {
        lines.push(format!("      services: {}", plan.services.join(", ")));
    }
    if let Some(hostname) = &plan.hostname {
        lines.push(format!("      hostname: {hostname}"));
    }
    if plan.loopbacks > 0 {
        lines.push(format!("      loopbacks: {}", plan.loopbacks));
    }
    lines
}
