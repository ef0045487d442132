//! Command-only services.
//!
//! A generic service has no requirements and no default mounts; its
//! commands and flags come entirely from its parameters.

use crate::descriptor::ServiceDescriptor;
use crate::params::{ParamMap, ParamValue, keys, param_map};

/// A service described only by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericService {
    name: String,
}

impl GenericService {
    /// Creates a descriptor called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ServiceDescriptor for GenericService {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_params(&self) -> ParamMap {
        param_map([
            (keys::AUTO_START, ParamValue::Bool(false)),
            (keys::AUTO_STOP, ParamValue::Bool(false)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use sandnet_core::namespace::NamespaceSet;

    use super::*;
    use crate::service::Service;
    use crate::testing::FakeNode;

    #[test]
    fn commands_come_from_parameters() {
        let mut svc = Service::new(
            Box::new(GenericService::new("sshd")),
            param_map([
                ("startCmd", ParamValue::from("/usr/sbin/sshd")),
                ("autoStart", true.into()),
            ]),
        )
        .expect("service");
        let mut h1 = FakeNode::new("h1", NamespaceSet::default());
        svc.setup(&mut h1, ParamMap::new()).expect("setup");
        assert!(svc.auto_start(&h1).expect("start").is_some());
        assert_eq!(h1.ran(), vec!["/usr/sbin/sshd"]);
    }

    #[test]
    fn off_by_default() {
        let mut svc = Service::new(Box::new(GenericService::new("sshd")), ParamMap::new()).expect("service");
        let mut h1 = FakeNode::new("h1", NamespaceSet::default());
        svc.setup(&mut h1, ParamMap::new()).expect("setup");
        assert_eq!(svc.auto_start(&h1).expect("auto start"), None);
        assert_eq!(svc.auto_stop(&h1).expect("auto stop"), None);
        assert!(h1.ran().is_empty());
    }
}
