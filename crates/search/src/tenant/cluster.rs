//! Per-tenant search cluster connection settings.

use serde::{Deserialize, Serialize};

/// Authentication for a tenant's search cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Connection descriptor for one tenant's search cluster.
///
/// Supplied by a [`TenantResolver`](super::TenantResolver) and treated as
/// read-only by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Host name or address.
    pub host: String,

    /// Port (default: 9200).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Whether to connect over TLS (default: true).
    #[serde(default = "default_https")]
    pub https: bool,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<ClusterAuth>,

    /// Whether to skip certificate validation (default: false).
    /// Only use for development/testing.
    #[serde(default)]
    pub disable_certificate_validation: bool,

    /// Transport timeout in milliseconds (default: 60000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_port() -> u16 {
    9200
}

fn default_https() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

impl ClusterSettings {
    /// Creates settings for a host with default port, TLS and timeout.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            https: default_https(),
            auth: None,
            disable_certificate_validation: false,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets whether TLS is used.
    pub fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    /// Sets the authentication.
    pub fn with_auth(mut self, auth: ClusterAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Returns the cluster base URL, e.g. `https://es.example.com:9243`.
    pub fn url(&self) -> String {
        let scheme = if self.https { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}
