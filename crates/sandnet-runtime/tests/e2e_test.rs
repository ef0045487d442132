//! End-to-end tests for a single sandbox node.
//!
//! The namespace-entry helper is replaced by [`common::RecordingRunner`];
//! everything else (directory creation, permission copies, scratch hosts
//! files, parameter resolution) runs for real against a temporary tree.

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use std::fs;
use std::sync::Arc;

use common::{RecordingRunner, RouterSuite, Scratch, scratch};
use nix::sys::signal::Signal;
use sandnet_common::config::ShellBuiltins;
use sandnet_common::error::SandnetError;
use sandnet_common::types::{ConfigStep, NodePhase};
use sandnet_core::helper::CommandRunner;
use sandnet_core::namespace::NamespaceSet;
use sandnet_core::sandbox::Sandboxable;
use sandnet_runtime::loopback::LoopbackSpec;
use sandnet_runtime::node::{SandboxNode, ServiceStatus};
use sandnet_runtime::options::NodeOptions;
use sandnet_service::params::{ParamMap, param_map};
use sandnet_service::registry::ServiceRegistry;
use sandnet_service::service::Service;

fn router_namespaces() -> NamespaceSet {
    NamespaceSet {
        mount: true,
        pid: true,
        ..NamespaceSet::default()
    }
}

fn node(scratch: &Scratch, namespaces: NamespaceSet, recorder: &Arc<RecordingRunner>) -> SandboxNode {
    let runner: Arc<dyn CommandRunner> = Arc::clone(recorder) as Arc<dyn CommandRunner>;
    SandboxNode::new("r1", namespaces, scratch.config.clone(), runner).expect("node")
}

fn router_registry(scratch: &Scratch) -> ServiceRegistry {
    let target = scratch.path("etc/router");
    fs::create_dir_all(&target).expect("mkdir target");
    let mut registry = ServiceRegistry::new();
    registry
        .register(Service::new(Box::new(RouterSuite::new(&target)), ParamMap::new()).expect("service"))
        .expect("register");
    registry
}

fn router_options(scratch: &Scratch) -> NodeOptions {
    let source = scratch.path("srv/router/r1");
    let mut options = NodeOptions {
        private_log_dir: true.into(),
        private_run_dir: true.into(),
        ..NodeOptions::default()
    };
    let _ = options.services.insert(
        RouterSuite::NAME.into(),
        param_map([("configPath", source.display().to_string())]),
    );
    options
}

// ── Shell ────────────────────────────────────────────────────────────

#[test]
fn pid_namespace_shell_uses_reported_pid() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    let mut n = node(&scratch, router_namespaces(), &recorder);

    n.start_shell().expect("start");
    assert_eq!(n.pid(), Some(4242));
    assert_eq!(n.phase(), NodePhase::ShellStarted);
    assert_eq!(recorder.spawns(), vec![n.launch_argv()]);

    assert!(matches!(n.start_shell(), Err(SandnetError::Conflict { .. })));
    assert_eq!(recorder.spawns().len(), 1);
}

#[test]
fn shell_outside_pid_namespace_uses_host_pid() {
    let scratch = scratch();
    let recorder = RecordingRunner::silent();
    let mut n = node(&scratch, NamespaceSet::default(), &recorder);
    n.start_shell().expect("start");
    assert_eq!(n.pid(), Some(common::FIRST_HOST_PID));
}

#[test]
fn missing_reported_pid_is_launch_error() {
    let scratch = scratch();
    let recorder = RecordingRunner::silent();
    let mut n = node(&scratch, router_namespaces(), &recorder);

    let err = n.start_shell().unwrap_err();
    assert!(matches!(err, SandnetError::Launch { .. }), "got: {err}");
    assert!(!n.is_running());
    assert_eq!(n.pid(), None);
    assert_eq!(recorder.events(), vec!["spawn 100", "terminate 100"]);
}

#[test]
fn commands_attach_to_every_namespace_of_the_shell() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    let mut n = node(&scratch, NamespaceSet::all(), &recorder);
    n.start_shell().expect("start");

    let out = n.run("ip link show").expect("run");
    assert!(out.success());
    assert_eq!(
        recorder.calls()[0],
        vec![
            "mxexec", "-d", "-a", "4242", "-b", "4242", "-k", "4242", "-j", "4242", "ip", "link",
            "show"
        ]
    );
}

#[test]
fn builtins_run_through_the_shell() {
    let mut scratch = scratch();
    scratch.config = scratch
        .config
        .clone()
        .with_builtins(ShellBuiltins::from_names(["cd", "ulimit"]));
    let recorder = RecordingRunner::new();
    let mut n = node(&scratch, router_namespaces(), &recorder);
    n.start_shell().expect("start");

    let _ = n.run("ulimit -c unlimited").expect("builtin");
    let _ = n.run("sysctl -w net.ipv4.ip_forward=1").expect("program");
    assert_eq!(
        recorder.commands(),
        vec!["bash -c ulimit -c unlimited", "sysctl -w net.ipv4.ip_forward=1"]
    );
}

// ── Configuration ────────────────────────────────────────────────────

#[test]
fn router_comes_up_with_private_dirs_and_config_mount() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    let mut registry = router_registry(&scratch);
    let mut n = node(&scratch, router_namespaces(), &recorder);
    n.start_shell().expect("start");

    n.configure(&router_options(&scratch), &mut registry)
        .expect("configure");
    assert_eq!(n.phase(), NodePhase::LoopbacksConfigured);
    assert!(n.has_private_logs());
    assert!(n.has_private_run());
    assert_eq!(n.private_log_dir(), Some(scratch.path("state/log/r1").as_path()));
    assert!(scratch.path("state/log/r1").is_dir());
    assert!(scratch.path("state/run/r1").is_dir());
    assert!(scratch.path("srv/router/r1").is_dir());
    assert_eq!(n.services(), [RouterSuite::NAME]);

    let target = scratch.path("etc/router");
    let config_binds: Vec<_> = recorder
        .commands()
        .into_iter()
        .filter(|c| c.starts_with("mount -n -B") && c.ends_with(&target.display().to_string()))
        .collect();
    assert_eq!(config_binds.len(), 1);
    assert_eq!(
        n.mounts().source_for(&target),
        Some(scratch.path("srv/router/r1").as_path())
    );
    assert_eq!(n.mounts().len(), 3);

    let reports = n.auto_start_services(&registry).expect("auto start");
    assert_eq!(reports.len(), 1);
    assert!(reports[0].succeeded());
    assert_eq!(recorder.count(RouterSuite::START), 1);
    assert_eq!(n.phase(), NodePhase::ServicesAutoStarted);
}

#[test]
fn router_without_private_run_fails_requirement_check() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    let mut registry = router_registry(&scratch);
    let mut n = node(&scratch, router_namespaces(), &recorder);
    n.start_shell().expect("start");

    let options = NodeOptions {
        private_run_dir: false.into(),
        ..router_options(&scratch)
    };
    let err = n.configure(&options, &mut registry).unwrap_err();
    match err {
        SandnetError::Step { node, step, source } => {
            assert_eq!(node, "r1");
            assert_eq!(step, ConfigStep::Services);
            assert!(
                matches!(*source, SandnetError::Requirement { ref capability, .. } if capability == "private /run"),
                "got: {source}"
            );
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(n.services().is_empty());
    assert!(!registry.get(RouterSuite::NAME).expect("svc").is_subscribed("r1"));
}

#[test]
fn failing_bind_aborts_at_private_logs() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    recorder.fail_when("mount -n -B", 32, "permission denied");
    let mut n = node(&scratch, router_namespaces(), &recorder);
    n.start_shell().expect("start");

    let options = NodeOptions {
        private_log_dir: true.into(),
        ..NodeOptions::default()
    };
    let err = n
        .configure(&options, &mut ServiceRegistry::new())
        .unwrap_err();
    match err {
        SandnetError::Step { step, source, .. } => {
            assert_eq!(step, ConfigStep::PrivateLogs);
            assert!(matches!(*source, SandnetError::Mount { exit_code: 32, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!n.has_private_logs());
    assert!(n.mounts().is_empty());
}

#[test]
fn configuring_twice_conflicts() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    let mut registry = router_registry(&scratch);
    let mut n = node(&scratch, router_namespaces(), &recorder);
    n.start_shell().expect("start");
    let options = router_options(&scratch);
    n.configure(&options, &mut registry).expect("configure");

    assert!(matches!(
        n.configure(&options, &mut registry),
        Err(SandnetError::Conflict { .. })
    ));
    assert!(matches!(
        n.setup_services(&mut registry, &options.services),
        Err(SandnetError::Conflict { .. })
    ));
    assert_eq!(n.services().len(), 1);
}

#[test]
fn hostname_binds_scratch_files_until_terminate() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    let mut n = node(&scratch, NamespaceSet::all(), &recorder);
    n.start_shell().expect("start");

    let options = NodeOptions {
        hostname: Some("r1".into()),
        ..NodeOptions::default()
    };
    n.configure(&options, &mut ServiceRegistry::new())
        .expect("configure");
    assert_eq!(n.hostname(), Some("r1"));
    assert_eq!(recorder.count("hostname r1"), 1);

    let hostname_src = n
        .mounts()
        .source_for(&scratch.config.hostname_target)
        .expect("hostname bound")
        .to_path_buf();
    assert_eq!(fs::read_to_string(&hostname_src).expect("read"), "r1");

    let hosts_src = n
        .mounts()
        .source_for(&scratch.config.hosts_target)
        .expect("hosts bound")
        .to_path_buf();
    let hosts = fs::read_to_string(&hosts_src).expect("read");
    assert!(hosts.starts_with("127.0.0.1\tlocalhost\n"));
    assert!(hosts.contains("127.0.1.1\tr1\n"));
    assert_eq!(
        fs::read_to_string(&scratch.config.hosts_target).expect("original"),
        "127.0.0.1\tlocalhost\n"
    );

    n.terminate().expect("terminate");
    assert!(!hostname_src.exists());
    assert!(!hosts_src.exists());
    assert_eq!(n.phase(), NodePhase::Terminal);
}

#[test]
fn failing_hostname_command_only_warns() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    recorder.fail_when("hostname r1", 1, "not permitted");
    let mut n = node(&scratch, NamespaceSet::all(), &recorder);
    n.start_shell().expect("start");
    n.setup_hostname("r1").expect("hostname");
    assert_eq!(n.hostname(), Some("r1"));
}

// ── Loopbacks ────────────────────────────────────────────────────────

#[test]
fn loopbacks_are_numbered_and_addressed() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    let mut n = node(&scratch, NamespaceSet::all(), &recorder);
    n.start_shell().expect("start");

    let options = NodeOptions {
        loopbacks: vec![
            LoopbackSpec {
                ip: Some("10.0.0.1".into()),
                index: None,
            },
            LoopbackSpec {
                ip: Some("10.0.1.1/24".into()),
                index: Some(5),
            },
            LoopbackSpec::default(),
        ],
        ..NodeOptions::default()
    };
    n.configure(&options, &mut ServiceRegistry::new())
        .expect("configure");

    let names: Vec<_> = n.loopbacks().map(|l| l.name()).collect();
    assert_eq!(names, vec!["lo:0", "lo:5", "lo:6"]);
    assert_eq!(
        recorder.commands(),
        vec![
            "ip addr add 10.0.0.1/32 dev lo label lo:0",
            "ip addr add 10.0.1.1/24 dev lo label lo:5",
        ]
    );
}

#[test]
fn failing_address_assignment_aborts_at_loopbacks() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    recorder.fail_when("ip addr add", 2, "RTNETLINK answers: File exists");
    let mut n = node(&scratch, NamespaceSet::all(), &recorder);
    n.start_shell().expect("start");

    let options = NodeOptions {
        loopbacks: vec![LoopbackSpec {
            ip: Some("10.0.0.1".into()),
            index: None,
        }],
        ..NodeOptions::default()
    };
    let err = n
        .configure(&options, &mut ServiceRegistry::new())
        .unwrap_err();
    assert!(matches!(
        err,
        SandnetError::Step {
            step: ConfigStep::Loopbacks,
            ..
        }
    ));
    assert_eq!(n.loopbacks().count(), 0);
}

// ── Services ─────────────────────────────────────────────────────────

#[test]
fn failing_stop_is_reported_not_raised() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    recorder.fail_when(RouterSuite::STOP, 1, "no pid file");
    let mut registry = router_registry(&scratch);
    let mut n = node(&scratch, router_namespaces(), &recorder);
    n.start_shell().expect("start");
    n.configure(&router_options(&scratch), &mut registry)
        .expect("configure");

    let reports = n.auto_stop_services(&registry);
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].succeeded());
    assert!(matches!(
        &reports[0].status,
        ServiceStatus::Completed(outcome) if outcome.exit_code == 1
    ));
    assert_eq!(reports[0].to_string(), "router (FAIL)");
    assert_eq!(n.phase(), NodePhase::ServicesStopping);
}

#[test]
fn stop_after_shell_is_gone_reports_failure() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    let mut registry = router_registry(&scratch);
    let mut n = node(&scratch, router_namespaces(), &recorder);
    n.start_shell().expect("start");
    n.configure(&router_options(&scratch), &mut registry)
        .expect("configure");
    n.stop_shell().expect("stop shell");

    let reports = n.auto_stop_services(&registry);
    assert!(matches!(&reports[0].status, ServiceStatus::Failed(_)));
    assert_eq!(recorder.count(RouterSuite::STOP), 0);
}

// ── Signals ──────────────────────────────────────────────────────────

#[test]
fn signal_inside_pid_namespace_uses_kill_in_node() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    let mut n = node(&scratch, router_namespaces(), &recorder);
    n.start_shell().expect("start");

    n.send_signal(Signal::SIGTERM).expect("signal");
    assert_eq!(recorder.commands(), vec!["kill -15 4242"]);
    assert!(recorder.signals().is_empty());
}

#[test]
fn signal_outside_pid_namespace_goes_to_shell() {
    let scratch = scratch();
    let recorder = RecordingRunner::silent();
    let mut n = node(&scratch, NamespaceSet::default(), &recorder);
    n.start_shell().expect("start");

    n.send_signal(Signal::SIGHUP).expect("signal");
    assert_eq!(recorder.signals(), vec![(100, Signal::SIGHUP)]);
    assert!(recorder.calls().is_empty());
}

#[test]
fn signal_without_shell_is_precondition_error() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    let mut n = node(&scratch, router_namespaces(), &recorder);
    assert!(matches!(
        n.send_signal(Signal::SIGTERM),
        Err(SandnetError::Precondition { .. })
    ));
}

#[test]
fn dropping_a_node_stops_its_shell() {
    let scratch = scratch();
    let recorder = RecordingRunner::new();
    {
        let mut n = node(&scratch, router_namespaces(), &recorder);
        n.start_shell().expect("start");
    }
    assert_eq!(recorder.events(), vec!["spawn 100", "terminate 100"]);
}
