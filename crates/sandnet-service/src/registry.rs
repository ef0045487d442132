//! Services of a network, keyed by name.

use std::collections::BTreeMap;

use sandnet_common::error::{Result, SandnetError};

use crate::service::Service;

/// Every service instance of a network. Nodes refer to services by name.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Service>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `service` under its name.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::Conflict`] if a service with the same name
    /// is already registered.
    pub fn register(&mut self, service: Service) -> Result<()> {
        let name = service.name().to_owned();
        if self.services.contains_key(&name) {
            return Err(SandnetError::Conflict {
                message: format!("service {name} is already registered"),
            });
        }
        tracing::debug!(service = %name, "registered service");
        let _ = self.services.insert(name, service);
        Ok(())
    }

    /// Looks up a service.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::NotFound`] if no service is called `name`.
    pub fn get(&self, name: &str) -> Result<&Service> {
        self.services.get(name).ok_or_else(|| not_found(name))
    }

    /// Looks up a service for setup.
    ///
    /// # Errors
    ///
    /// Returns [`SandnetError::NotFound`] if no service is called `name`.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Service> {
        self.services.get_mut(name).ok_or_else(|| not_found(name))
    }

    /// Whether a service is called `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Registered services, by name.
    pub fn iter(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no service is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn not_found(name: &str) -> SandnetError {
    SandnetError::NotFound {
        kind: "service",
        id: name.to_owned(),
    }
}
