//! The owning collection: every node and service of one emulated network.
//!
//! Bring-up launches every shell, configures every node, then auto-starts
//! services. Teardown stops services on all nodes before any shell goes
//! away, so a service that talks to a peer during shutdown still can.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use sandnet_common::config::SandnetConfig;
use sandnet_common::error::{Result, SandnetError};
use sandnet_common::types::ConfigStep;
use sandnet_core::helper::CommandRunner;
use sandnet_core::namespace::NamespaceSet;
use sandnet_core::sandbox::Sandboxable;
use sandnet_service::registry::ServiceRegistry;
use sandnet_service::service::Service;
use serde::Serialize;

use crate::node::{SandboxNode, ServiceReport};
use crate::options::NodeOptions;

/// Service results for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeReport {
    /// Node name.
    pub node: String,
    /// One entry per service that acted.
    pub services: Vec<ServiceReport>,
}

impl fmt::Display for NodeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.node)?;
        for report in &self.services {
            write!(f, " {report}")?;
        }
        Ok(())
    }
}

/// What bring-up will do for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodePlan {
    /// Node name.
    pub name: String,
    /// Active namespace kinds.
    pub namespaces: Vec<&'static str>,
    /// Helper command line launching the shell.
    pub launch: Vec<String>,
    /// Source of the private `/var/log`.
    pub private_log_dir: Option<PathBuf>,
    /// Source of the private `/run`.
    pub private_run_dir: Option<PathBuf>,
    /// Number of extra binds.
    pub private_mounts: usize,
    /// Subscribed services.
    pub services: Vec<String>,
    /// Hostname.
    pub hostname: Option<String>,
    /// Number of loopback aliases.
    pub loopbacks: usize,
}

struct Member {
    node: SandboxNode,
    options: NodeOptions,
}

/// Nodes and services of one network.
pub struct Network {
    config: SandnetConfig,
    runner: Arc<dyn CommandRunner>,
    services: ServiceRegistry,
    members: Vec<Member>,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("config", &self.config)
            .field("services", &self.services)
            .field("nodes", &self.members.iter().map(|m| &m.node).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Network {
    /// Creates an empty network.
    pub fn new(config: SandnetConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            runner,
            services: ServiceRegistry::new(),
            members: Vec::new(),
        }
    }

    /// Configuration shared by every node.
    #[must_use]
    pub const fn config(&self) -> &SandnetConfig {
        &self.config
    }

    /// Registered services.
    #[must_use]
    pub const fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    /// Registers a service.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::Conflict`] on a duplicate name.
    pub fn add_service(&mut self, service: Service) -> Result<()> {
        self.services.register(service)
    }

    /// Adds a node, checking everything that can be checked before launch.
    ///
    /// # Errors
    ///
    /// - [`SandnetError::Conflict`] if the name is taken.
    /// - [`SandnetError::InvalidConfig`] for impossible namespaces or a
    ///   hostname without mount and UTS namespaces.
    /// - [`SandnetError::NotFound`] for an unregistered service.
    /// - [`SandnetError::Config`] for a parameter the service rejects.
    pub fn add_node(&mut self, name: &str, namespaces: NamespaceSet, options: NodeOptions) -> Result<&SandboxNode> {
        if self.node(name).is_some() {
            return Err(SandnetError::Conflict {
                message: format!("node {name} already exists"),
            });
        }
        if options.hostname.is_some() && !namespaces.supports_hostname() {
            return Err(SandnetError::InvalidConfig {
                node: name.to_owned(),
                message: "hostname requires mount and UTS namespaces".into(),
            });
        }
        for (service, params) in &options.services {
            self.services.get(service)?.validate_keys(params)?;
        }
        let node = SandboxNode::new(name, namespaces, self.config.clone(), Arc::clone(&self.runner))?;
        self.members.push(Member { node, options });
        Ok(&self.members[self.members.len() - 1].node)
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&SandboxNode> {
        self.members.iter().map(|m| &m.node).find(|n| n.name() == name)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &SandboxNode> {
        self.members.iter().map(|m| &m.node)
    }

    /// What bring-up will do, node by node.
    #[must_use]
    pub fn plan(&self) -> Vec<NodePlan> {
        self.members
            .iter()
            .map(|Member { node, options }| NodePlan {
                name: node.name().to_owned(),
                namespaces: node.namespaces().kinds(),
                launch: node.launch_argv(),
                private_log_dir: options
                    .private_log_dir
                    .source(&self.config.log_root, node.name()),
                private_run_dir: options
                    .private_run_dir
                    .source(&self.config.run_root, node.name()),
                private_mounts: options.private_mounts.len(),
                services: options.services.keys().cloned().collect(),
                hostname: options.hostname.clone(),
                loopbacks: options.loopbacks.len(),
            })
            .collect()
    }

    /// Brings the network up.
    ///
    /// On error the network is left partly up; call [`Network::stop`] to
    /// tear down whatever was started.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::Step`] naming the node and step that failed.
    pub fn start(&mut self) -> Result<Vec<NodeReport>> {
        tracing::info!(nodes = self.members.len(), "starting node shells");
        for member in &mut self.members {
            member
                .node
                .start_shell()
                .map_err(|e| e.at_step(member.node.name(), ConfigStep::Shell))?;
        }

        tracing::info!("configuring nodes");
        for Member { node, options } in &mut self.members {
            node.configure(options, &mut self.services)?;
        }

        tracing::info!("starting node services");
        let mut reports = Vec::new();
        for member in &mut self.members {
            let services = member
                .node
                .auto_start_services(&self.services)
                .map_err(|e| e.at_step(member.node.name(), ConfigStep::ServiceStart))?;
            if services.is_empty() {
                continue;
            }
            let report = NodeReport {
                node: member.node.name().to_owned(),
                services,
            };
            tracing::info!("{report}");
            reports.push(report);
        }
        for member in &mut self.members {
            member.node.mark_running();
        }
        Ok(reports)
    }

    /// Tears the network down: services on every node first, then every
    /// shell. Never fails; service problems are in the reports.
    pub fn stop(&mut self) -> Vec<NodeReport> {
        tracing::info!("stopping node services");
        let mut reports = Vec::new();
        for member in &mut self.members {
            let services = member.node.auto_stop_services(&self.services);
            if services.is_empty() {
                continue;
            }
            let report = NodeReport {
                node: member.node.name().to_owned(),
                services,
            };
            tracing::info!("{report}");
            reports.push(report);
        }

        tracing::info!("stopping node shells");
        for member in &mut self.members {
            if let Err(e) = member.node.stop_shell() {
                tracing::warn!(node = %member.node.name(), error = %e, "failed to stop shell");
            }
        }
        for member in &mut self.members {
            if let Err(e) = member.node.terminate() {
                tracing::warn!(node = %member.node.name(), error = %e, "failed to release node");
            }
        }
        reports
    }
}
