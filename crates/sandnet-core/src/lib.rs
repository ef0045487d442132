//! # sandnet-core
//!
//! Low-level Linux isolation primitives for sandnet nodes.
//!
//! This crate provides:
//! - **Filesystem**: permission reconciliation, idempotent directory setup,
//!   and bind mounts into a node's private mount namespace.
//! - **Namespaces**: which namespaces a node gets and the helper flags that
//!   create or join them.
//! - **Helper**: invocation of the namespace-entry helper behind the
//!   [`helper::CommandRunner`] seam.
//! - **Sandbox**: the [`sandbox::Sandboxable`] capability trait.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod helper;
pub mod namespace;
pub mod sandbox;
