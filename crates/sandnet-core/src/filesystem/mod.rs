//! Filesystem management for sandbox isolation.
//!
//! Provides permission reconciliation, idempotent directory setup, and
//! bind mounts into a node's private mount namespace.

pub mod mount;
pub mod path;
pub mod permission;
