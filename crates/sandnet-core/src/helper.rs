//! Invocation of the namespace-entry helper and other external commands.
//!
//! The helper (`mxexec` by default) is called as `<helper> <flags>
//! <command...>`. With launch flags it creates the requested namespaces and
//! starts a long-lived shell in them; with attach flags it runs a command
//! inside the namespaces of an existing sandbox. Every external process goes
//! through a [`CommandRunner`] so callers can substitute their own.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use sandnet_common::error::{Result, SandnetError};

use crate::namespace::NamespaceSet;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code returned by the command (`-1` if killed by a signal).
    pub exit_code: i32,
}

impl ExecOutput {
    /// Returns whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A long-lived process started through [`CommandRunner::spawn`].
pub trait ShellProcess: Send {
    /// PID of the process as seen from the host.
    fn pid(&self) -> u32;

    /// Reads one line of the process's standard output.
    ///
    /// Returns `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipe cannot be read.
    fn read_line(&mut self) -> Result<Option<String>>;

    /// Delivers `signal` to the process from outside.
    ///
    /// # Errors
    ///
    /// Returns an error if `kill(2)` fails.
    fn signal(&mut self, signal: Signal) -> Result<()>;

    /// Kills the process and reaps it.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be killed or waited for.
    fn terminate(&mut self) -> Result<()>;
}

/// Executes external programs on behalf of the runtime.
pub trait CommandRunner: Send + Sync {
    /// Runs `argv` to completion, capturing its output.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started.
    fn output(&self, argv: &[String]) -> Result<ExecOutput>;

    /// Starts `argv` with piped standard input and output.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be started.
    fn spawn(&self, argv: &[String]) -> Result<Box<dyn ShellProcess>>;
}

/// Runs programs with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn output(&self, argv: &[String]) -> Result<ExecOutput> {
        let (program, args) = split_argv(argv)?;
        tracing::debug!(cmd = ?argv, "running command");
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SandnetError::io(program, e))?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn spawn(&self, argv: &[String]) -> Result<Box<dyn ShellProcess>> {
        let (program, args) = split_argv(argv)?;
        tracing::debug!(cmd = ?argv, "spawning process");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SandnetError::io(program, e))?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| SandnetError::Precondition {
            message: format!("{program} started without a stdout pipe"),
        })?;
        Ok(Box::new(SystemShell {
            child,
            _stdin: stdin,
            stdout: BufReader::new(stdout),
        }))
    }
}

/// A child process owned by [`SystemRunner`].
///
/// Standard input is kept open for the life of the process; an interactive
/// shell exits as soon as it sees end of input.
struct SystemShell {
    child: Child,
    _stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl ShellProcess for SystemShell {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| SandnetError::io(format!("/proc/{}/fd/1", self.child.id()), e))?;
        Ok((n > 0).then_some(line))
    }

    fn signal(&mut self, signal: Signal) -> Result<()> {
        let pid = host_pid(self.child.id())?;
        nix::sys::signal::kill(pid, signal)
            .map_err(|e| SandnetError::io(format!("/proc/{}", self.child.id()), e.into()))
    }

    fn terminate(&mut self) -> Result<()> {
        let proc_path = format!("/proc/{}", self.child.id());
        if self
            .child
            .try_wait()
            .map_err(|e| SandnetError::io(&proc_path, e))?
            .is_none()
        {
            self.child
                .kill()
                .map_err(|e| SandnetError::io(&proc_path, e))?;
        }
        let _ = self
            .child
            .wait()
            .map_err(|e| SandnetError::io(&proc_path, e))?;
        Ok(())
    }
}

fn split_argv(argv: &[String]) -> Result<(&str, &[String])> {
    argv.split_first()
        .map(|(program, args)| (program.as_str(), args))
        .ok_or_else(|| SandnetError::Config {
            message: "empty command".into(),
        })
}

/// Converts a host PID into a [`nix`] PID.
///
/// # Errors
///
/// Returns an error if `pid` does not fit a `pid_t`.
pub fn host_pid(pid: u32) -> Result<Pid> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| SandnetError::Config {
            message: format!("pid {pid} out of range"),
        })
}

/// Builds command lines for the namespace-entry helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Helper {
    program: PathBuf,
}

impl Helper {
    /// Uses `program` as the helper.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The helper program.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command line launching `command` in a fresh sandbox.
    #[must_use]
    pub fn launch_argv(&self, namespaces: &NamespaceSet, command: &[String]) -> Vec<String> {
        let mut argv = vec![self.program.display().to_string(), namespaces.launch_flags()];
        argv.extend_from_slice(command);
        argv
    }

    /// Command line running `command` inside the sandbox of `pid`.
    #[must_use]
    pub fn attach_argv(&self, namespaces: &NamespaceSet, pid: u32, command: &[String]) -> Vec<String> {
        let mut argv = vec![self.program.display().to_string()];
        argv.extend(namespaces.attach_args(pid));
        argv.extend_from_slice(command);
        argv
    }
}

/// Extracts the PID the helper prints when launching with `-p`.
///
/// The helper may prefix the number with a `\x01` marker.
#[must_use]
pub fn parse_reported_pid(line: &str) -> Option<u32> {
    line.trim().trim_start_matches('\u{1}').trim().parse().ok()
}
