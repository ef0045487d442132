//! # sandnet-service
//!
//! Daemons that run inside sandnet nodes.
//!
//! A [`service::Service`] is shared by every node that uses it. Each node
//! subscribes once with its own parameter overrides, gets the service's
//! mounts bound into its private mount namespace, and later has the
//! service started and stopped with commands resolved for that node.
//!
//! What differs between daemons lives behind the
//! [`descriptor::ServiceDescriptor`] trait; [`quagga`] and [`generic`]
//! provide the bundled descriptors.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod descriptor;
pub mod generic;
pub mod params;
pub mod quagga;
pub mod registry;
pub mod service;

#[cfg(test)]
mod testing;
