//! Trigger configuration.

use std::net::SocketAddr;

/// Configuration for the trigger endpoint.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// HTTP method that starts a run.
    pub method: String,
    /// Route that starts a run.
    pub path: String,
    /// Shared secret expected as a bearer token. `None` disables the check.
    pub secret: Option<String>,
}

impl TriggerConfig {
    /// Creates a configuration bound to `bind_addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            method: "GET".into(),
            path: "/api".into(),
            secret: None,
        }
    }

    /// Sets the HTTP method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Sets the route.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Requires `Authorization: Bearer <secret>`.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 3000)))
    }
}
