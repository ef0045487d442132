//! Shared fixtures for the runtime integration tests.
//!
//! [`RecordingRunner`] stands in for the namespace-entry helper: it records
//! every command, answers with scripted exit codes and hands out fake shells
//! that report a PID like the real helper does.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use nix::sys::signal::Signal;
use sandnet_common::config::SandnetConfig;
use sandnet_common::error::{Result, SandnetError};
use sandnet_core::filesystem::mount::{MountPoint, MountSide};
use sandnet_core::filesystem::path::PathSpec;
use sandnet_core::helper::{CommandRunner, ExecOutput, ShellProcess};
use sandnet_core::sandbox::Sandboxable;
use sandnet_service::descriptor::ServiceDescriptor;
use sandnet_service::params::{ParamMap, ParamValue, param_map};
use tempfile::TempDir;

/// Offset between the host PID of a fake shell and the PID it reports.
pub const REPORTED_PID_OFFSET: u32 = 4142;

/// First host PID handed out.
pub const FIRST_HOST_PID: u32 = 100;

/// Records commands instead of running them.
pub struct RecordingRunner {
    events: Arc<Mutex<Vec<String>>>,
    calls: Mutex<Vec<Vec<String>>>,
    spawns: Mutex<Vec<Vec<String>>>,
    failures: Mutex<Vec<(String, ExecOutput)>>,
    signals: Arc<Mutex<Vec<(u32, Signal)>>>,
    next_pid: AtomicU32,
    report_pid: bool,
}

impl RecordingRunner {
    /// Shells report their PID on the first line, like `mxexec -p`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_reporting(true))
    }

    /// Shells print nothing.
    pub fn silent() -> Arc<Self> {
        Arc::new(Self::with_reporting(false))
    }

    fn with_reporting(report_pid: bool) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            calls: Mutex::new(Vec::new()),
            spawns: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            signals: Arc::new(Mutex::new(Vec::new())),
            next_pid: AtomicU32::new(FIRST_HOST_PID),
            report_pid,
        }
    }

    /// Any command whose joined argv contains `needle` exits with `code`.
    pub fn fail_when(&self, needle: &str, code: i32, stderr: &str) {
        self.failures.lock().unwrap().push((
            needle.to_owned(),
            ExecOutput {
                exit_code: code,
                stderr: stderr.to_owned(),
                ..ExecOutput::default()
            },
        ));
    }

    /// Every argv passed to `output`, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Every argv passed to `spawn`, in order.
    pub fn spawns(&self) -> Vec<Vec<String>> {
        self.spawns.lock().unwrap().clone()
    }

    /// The in-node part of every command, helper flags stripped.
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(|argv| strip_helper(argv).join(" ")).collect()
    }

    /// How many in-node commands equal `command`.
    pub fn count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| *c == command).count()
    }

    /// Commands and shell terminations, interleaved in order.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Signals delivered to shells from outside.
    pub fn signals(&self) -> Vec<(u32, Signal)> {
        self.signals.lock().unwrap().clone()
    }
}

fn strip_helper(argv: &[String]) -> &[String] {
    let mut rest = argv.get(2..).unwrap_or_default();
    while let [flag, _pid, tail @ ..] = rest {
        if !["-a", "-b", "-k", "-j"].contains(&flag.as_str()) {
            break;
        }
        rest = tail;
    }
    rest
}

impl CommandRunner for RecordingRunner {
    fn output(&self, argv: &[String]) -> Result<ExecOutput> {
        let joined = argv.join(" ");
        self.events
            .lock()
            .unwrap()
            .push(format!("exec {}", strip_helper(argv).join(" ")));
        self.calls.lock().unwrap().push(argv.to_vec());
        let failure = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| joined.contains(needle.as_str()))
            .map(|(_, out)| out.clone());
        Ok(failure.unwrap_or_default())
    }

    fn spawn(&self, argv: &[String]) -> Result<Box<dyn ShellProcess>> {
        self.spawns.lock().unwrap().push(argv.to_vec());
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(format!("spawn {pid}"));
        Ok(Box::new(FakeShell {
            pid,
            first_line: self
                .report_pid
                .then(|| format!("\u{1}{}\n", pid + REPORTED_PID_OFFSET)),
            events: Arc::clone(&self.events),
            signals: Arc::clone(&self.signals),
            alive: true,
        }))
    }
}

struct FakeShell {
    pid: u32,
    first_line: Option<String>,
    events: Arc<Mutex<Vec<String>>>,
    signals: Arc<Mutex<Vec<(u32, Signal)>>>,
    alive: bool,
}

impl ShellProcess for FakeShell {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.first_line.take())
    }

    fn signal(&mut self, signal: Signal) -> Result<()> {
        if !self.alive {
            return Err(SandnetError::Precondition {
                message: "shell is gone".into(),
            });
        }
        self.signals.lock().unwrap().push((self.pid, signal));
        Ok(())
    }

    fn terminate(&mut self) -> Result<()> {
        self.alive = false;
        self.events
            .lock()
            .unwrap()
            .push(format!("terminate {}", self.pid));
        Ok(())
    }
}

/// Scratch stand-ins for the host directories a node covers.
pub struct Scratch {
    pub dir: TempDir,
    pub config: SandnetConfig,
}

impl Scratch {
    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }
}

/// Builds a scratch host: `var/log`, `run`, `etc/hostname`, `etc/hosts`.
pub fn scratch() -> Scratch {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    for sub in ["var/log", "run", "etc"] {
        fs::create_dir_all(root.join(sub)).expect("mkdir");
    }
    fs::write(root.join("etc/hostname"), "host\n").expect("hostname");
    fs::write(root.join("etc/hosts"), "127.0.0.1\tlocalhost\n").expect("hosts");

    let config = SandnetConfig {
        log_root: root.join("state/log"),
        run_root: root.join("state/run"),
        log_target: root.join("var/log"),
        run_target: root.join("run"),
        hostname_target: root.join("etc/hostname"),
        hosts_target: root.join("etc/hosts"),
        hosts_template: root.join("etc/hosts"),
        ..SandnetConfig::default()
    };
    Scratch { dir, config }
}

/// A Quagga-shaped service whose config mount targets a scratch directory.
pub struct RouterSuite {
    config_target: PathBuf,
}

impl RouterSuite {
    pub const NAME: &'static str = "router";
    pub const START: &'static str = "/etc/init.d/router start";
    pub const STOP: &'static str = "/etc/init.d/router stop";

    pub fn new(config_target: &Path) -> Self {
        Self {
            config_target: config_target.to_path_buf(),
        }
    }
}

impl ServiceDescriptor for RouterSuite {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn default_params(&self) -> ParamMap {
        param_map([
            ("startCmd", ParamValue::from(Self::START)),
            ("stopCmd", Self::STOP.into()),
            ("autoStart", true.into()),
            ("autoStop", true.into()),
        ])
    }

    fn default_mounts(&self) -> Vec<(String, MountPoint)> {
        vec![(
            "configPath".to_owned(),
            MountPoint {
                target: MountSide::Path(self.config_target.clone()),
                source: Some(MountSide::Spec(PathSpec {
                    path: None,
                    create: true,
                    create_recursive: true,
                    ..PathSpec::default()
                })),
            },
        )]
    }

    fn verify_requirements(&self, node: &dyn Sandboxable) -> Result<()> {
        let missing = if !node.namespaces().pid {
            Some("PID namespace")
        } else if !node.has_private_logs() {
            Some("private logs")
        } else if !node.has_private_run() {
            Some("private /run")
        } else {
            None
        };
        match missing {
            Some(capability) => Err(SandnetError::Requirement {
                service: Self::NAME.to_owned(),
                node: node.name().to_owned(),
                capability: capability.to_owned(),
            }),
            None => Ok(()),
        }
    }
}
