//! # sandnet-runtime
//!
//! Sandbox nodes and the networks that own them.
//!
//! A [`node::SandboxNode`] launches a shell in its namespaces, then applies
//! its configuration in a fixed order: private log directory, private run
//! directory, extra private mounts, service subscriptions, hostname and
//! loopback aliases. A [`network::Network`] drives many nodes through
//! bring-up and teardown, and [`topology::Topology`] builds one from YAML.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod loopback;
pub mod network;
pub mod node;
pub mod options;
pub mod topology;
