//! Seed and peer host addressing.

use serde::{Deserialize, Serialize};

/// A single address the client can dial: either a user-provided seed, or a
/// peer discovered through the tend loop.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    pub address: String,
    /// Expected TLS server name, if TLS is in use. When absent, `address`
    /// is used for SNI and SAN/CN verification.
    pub tls_name: Option<String>,
    pub port: u16,
}

impl Host {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            tls_name: None,
            port,
        }
    }

    pub fn with_tls_name(mut self, tls_name: impl Into<String>) -> Self {
        self.tls_name = Some(tls_name.into());
        self
    }

    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_socket_addr_string() {
        let h = Host::new("10.0.0.1", 3000);
        assert_eq!(h.to_string(), h.socket_addr_string());
    }

    #[test]
    fn with_tls_name_sets_field() {
        let h = Host::new("10.0.0.1", 3000).with_tls_name("node1.meridian.local");
        assert_eq!(h.tls_name.as_deref(), Some("node1.meridian.local"));
    }
}
