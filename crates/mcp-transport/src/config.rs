//! Transport configuration.

/// Connection parameters for [`crate::LineTransport::connect`] (§6
/// "Operational configuration").
///
/// Field names and defaults are normative: callers and tests depend on
/// `secure` and `accept_any_peer_cert` both defaulting to `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    /// Wrap the connection in TLS.
    pub secure: bool,
    /// Skip peer certificate validation. Only meaningful when `secure` is
    /// set; still negotiates TLS, it just accepts any certificate chain
    /// (§1 "Deliberately out of scope": the cert-store policy beyond this
    /// toggle is not configurable here).
    pub accept_any_peer_cert: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            secure: false,
            accept_any_peer_cert: false,
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub const fn accept_any_peer_cert(mut self, accept: bool) -> Self {
        self.accept_any_peer_cert = accept;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_plaintext_and_strict() {
        let config = TransportConfig::default();
        assert!(!config.secure);
        assert!(!config.accept_any_peer_cert);
    }

    #[test]
    fn builder_sets_fields() {
        let config = TransportConfig::new("mud.example.org", 8888)
            .secure(true)
            .accept_any_peer_cert(true);
        assert_eq!(config.host, "mud.example.org");
        assert_eq!(config.port, 8888);
        assert!(config.secure);
        assert!(config.accept_any_peer_cert);
    }
}
