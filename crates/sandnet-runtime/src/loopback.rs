//! Numbered loopback aliases (`lo:N`) inside a node.
//!
//! Aliases are append-only: once created they keep their number for the
//! life of the node and are never renamed or removed.

use sandnet_common::constants::LOOPBACK_DEVICE;
use serde::{Deserialize, Serialize};

/// A requested loopback alias.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoopbackSpec {
    /// Address to assign, with or without a prefix length.
    pub ip: Option<String>,
    /// Alias number; the next free one when absent.
    pub index: Option<u32>,
}

/// A loopback alias that exists in a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoopbackInterface {
    index: u32,
    address: Option<String>,
}

impl LoopbackInterface {
    /// Creates the record for alias `index`.
    #[must_use]
    pub const fn new(index: u32, address: Option<String>) -> Self {
        Self { index, address }
    }

    /// Alias number.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Interface name, `lo:<index>`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{LOOPBACK_DEVICE}:{}", self.index)
    }

    /// Assigned address in CIDR form, `/32` when no prefix was given.
    #[must_use]
    pub fn address(&self) -> Option<String> {
        self.address.as_ref().map(|ip| {
            if ip.contains('/') {
                ip.clone()
            } else {
                format!("{ip}/32")
            }
        })
    }

    /// Command assigning the address, if there is one.
    #[must_use]
    pub fn config_argv(&self) -> Option<Vec<String>> {
        self.address().map(|addr| {
            vec![
                "ip".to_owned(),
                "addr".to_owned(),
                "add".to_owned(),
                addr,
                "dev".to_owned(),
                LOOPBACK_DEVICE.to_owned(),
                "label".to_owned(),
                self.name(),
            ]
        })
    }

    /// Renaming a loopback alias does nothing.
    pub fn rename(&self, new_name: &str) {
        tracing::debug!(intf = %self.name(), new_name, "ignoring loopback rename");
    }

    /// Deleting a loopback alias does nothing.
    pub fn delete(&self) {
        tracing::debug!(intf = %self.name(), "ignoring loopback delete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_and_address_command() {
        let intf = LoopbackInterface::new(2, Some("10.0.0.1".into()));
        assert_eq!(intf.name(), "lo:2");
        assert_eq!(
            intf.config_argv().expect("argv"),
            vec!["ip", "addr", "add", "10.0.0.1/32", "dev", "lo", "label", "lo:2"]
        );
    }

    #[test]
    fn prefix_is_kept() {
        let intf = LoopbackInterface::new(0, Some("192.168.1.1/24".into()));
        assert_eq!(intf.address().as_deref(), Some("192.168.1.1/24"));
        assert_eq!(LoopbackInterface::new(0, None).config_argv(), None);
    }

    #[test]
    fn rename_and_delete_leave_interface_unchanged() {
        let intf = LoopbackInterface::new(3, None);
        let before = intf.clone();
        intf.rename("lo:9");
        intf.delete();
        assert_eq!(intf, before);
    }
}
