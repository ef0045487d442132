//! Unified error types for the sandnet workspace.
//!
//! Every crate returns [`SandnetError`]. Construction and configuration
//! failures abort the offending step; service stop failures are reported as
//! data by the callers instead of being raised.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ConfigStep;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum SandnetError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A node was described with an impossible namespace combination.
    #[error("invalid node configuration for {node}: {message}")]
    InvalidConfig {
        /// Node being constructed or configured.
        node: String,
        /// Description of the violated invariant.
        message: String,
    },

    /// Something was set up twice.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the duplicate.
        message: String,
    },

    /// A node does not provide a capability a service needs.
    #[error("service {service} requires {capability} (node {node})")]
    Requirement {
        /// Service whose requirement is unmet.
        service: String,
        /// Node that lacks the capability.
        node: String,
        /// Missing capability, e.g. "PID namespace".
        capability: String,
    },

    /// A required resource (user, group, service, node) was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A required command or parameter is missing or has the wrong shape.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// An operation was attempted before the state it depends on exists.
    #[error("precondition failed: {message}")]
    Precondition {
        /// Description of the unmet precondition.
        message: String,
    },

    /// A bind mount inside a sandbox failed.
    #[error("unable to bind {source_path} to {target} (exit {exit_code}): {stderr}")]
    Mount {
        /// Path being attached.
        source_path: PathBuf,
        /// Attachment point inside the sandbox.
        target: PathBuf,
        /// Exit code of the mount command.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// Launching or talking to a sandboxed process failed.
    #[error("launch failed for {node}: {message}")]
    Launch {
        /// Node whose process could not be launched.
        node: String,
        /// Description of the failure, including captured output.
        message: String,
    },

    /// An operation referenced a service the node never subscribed to.
    #[error("service {service} has not been set up for node {node}")]
    NotSubscribed {
        /// Service name.
        service: String,
        /// Node name.
        node: String,
    },

    /// A parameter lookup missed and no default was supplied.
    #[error("parameter {key} is not defined for {entity}")]
    KeyNotFound {
        /// Entity whose parameters were consulted.
        entity: String,
        /// Missing key.
        key: String,
    },

    /// A filesystem object does not carry the required ownership or mode.
    #[error("insufficient or unexpected permissions for {path}: {message}")]
    Permission {
        /// Offending path.
        path: PathBuf,
        /// What was expected.
        message: String,
    },

    /// A service start command failed and the node asked for escalation.
    #[error("error starting service {service} on {node} (exit {exit_code}): {stderr}")]
    ServiceFailed {
        /// Service name.
        service: String,
        /// Node name.
        node: String,
        /// Exit code of the start command.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// A configuration step of a node failed.
    #[error("node {node}: {step} failed: {source}")]
    Step {
        /// Node being configured.
        node: String,
        /// Step that failed.
        step: ConfigStep,
        /// Underlying cause.
        source: Box<SandnetError>,
    },

    /// A topology document could not be parsed.
    #[error("topology error: {source}")]
    Topology {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl SandnetError {
    /// Wraps an error with the node and configuration step it occurred in.
    #[must_use]
    pub fn at_step(self, node: &str, step: ConfigStep) -> Self {
        Self::Step {
            node: node.to_owned(),
            step,
            source: Box::new(self),
        }
    }

    /// Builds an [`SandnetError::Io`] from a path and an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SandnetError>;
