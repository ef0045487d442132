//! Declarative network descriptions in YAML.
//!
//! ```yaml
//! settings:
//!   helper: /usr/local/bin/mxexec
//! services:
//!   - name: Quagga
//!     kind: quagga
//! nodes:
//!   - name: r1
//!     namespaces: { network: true, mount: true, pid: true, uts: true }
//!     options:
//!       private_log_dir: true
//!       private_run_dir: true
//!       services:
//!         Quagga:
//!           quaggaConfigPath: /srv/quagga/r1
//!       hostname: r1
//! ```

use std::path::Path;
use std::sync::Arc;

use sandnet_common::config::SandnetConfig;
use sandnet_common::error::{Result, SandnetError};
use sandnet_core::helper::CommandRunner;
use sandnet_core::namespace::NamespaceSet;
use sandnet_service::descriptor::ServiceDescriptor;
use sandnet_service::generic::GenericService;
use sandnet_service::params::ParamMap;
use sandnet_service::quagga::QuaggaService;
use sandnet_service::service::Service;
use serde::{Deserialize, Serialize};

use crate::network::Network;
use crate::options::NodeOptions;

/// Which descriptor backs a declared service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// [`QuaggaService`].
    Quagga,
    /// [`GenericService`].
    Generic,
}

/// A service instance shared by the nodes that name it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDecl {
    /// Name nodes refer to.
    pub name: String,
    /// Descriptor kind.
    pub kind: ServiceKind,
    /// Service-wide parameter overrides.
    #[serde(default)]
    pub params: ParamMap,
}

impl ServiceDecl {
    fn descriptor(&self) -> Box<dyn ServiceDescriptor> {
        match self.kind {
            ServiceKind::Quagga => Box::new(QuaggaService::named(self.name.clone())),
            ServiceKind::Generic => Box::new(GenericService::new(self.name.clone())),
        }
    }
}

/// One node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeDecl {
    /// Unique node name.
    pub name: String,
    /// Namespaces the node lives in.
    #[serde(default)]
    pub namespaces: NamespaceSet,
    /// Configuration applied after the shell starts.
    #[serde(default)]
    pub options: NodeOptions,
}

/// A whole network description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Topology {
    /// Runtime settings.
    #[serde(default)]
    pub settings: SandnetConfig,
    /// Shared services.
    #[serde(default)]
    pub services: Vec<ServiceDecl>,
    /// Nodes, brought up in order.
    #[serde(default)]
    pub nodes: Vec<NodeDecl>,
}

impl Topology {
    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::Topology`] for malformed YAML or unknown
    /// keys.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Reads and parses a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| SandnetError::io(path, e))?;
        let topology = Self::from_yaml(&raw)?;
        tracing::debug!(
            path = %path.display(),
            services = topology.services.len(),
            nodes = topology.nodes.len(),
            "loaded topology"
        );
        Ok(topology)
    }

    /// Whether any declared service is a Quagga instance.
    #[must_use]
    pub fn uses_quagga(&self) -> bool {
        self.services.iter().any(|s| s.kind == ServiceKind::Quagga)
    }

    /// Builds the network without launching anything.
    ///
    /// # Errors
    ///
    /// Returns the first error from service registration or
    /// [`Network::add_node`].
    pub fn into_network(self, runner: Arc<dyn CommandRunner>) -> Result<Network> {
        let mut network = Network::new(self.settings, runner);
        for decl in self.services {
            let service = Service::new(decl.descriptor(), decl.params)?;
            network.add_service(service)?;
        }
        for decl in self.nodes {
            let _ = network.add_node(&decl.name, decl.namespaces, decl.options)?;
        }
        Ok(network)
    }
}
