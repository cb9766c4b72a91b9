//! Server configuration
//!
//! Bind settings for the VolGate HTTP listener and the Prometheus exporter.

use crate::error::{Result, ServerError};
use std::net::SocketAddr;

/// Default port assignments
pub mod ports {
    /// Surface API
    pub const VOLGATE_HTTP: u16 = 8087;
    /// Prometheus exporter
    pub const VOLGATE_METRICS: u16 = 9187;
}

/// Bind configuration for the service
///
/// ```
/// use server::config::ServerConfig;
///
/// let config = ServerConfig::http_only("127.0.0.1", 8087);
/// assert_eq!(config.metrics_port, None);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub http_port: u16,
    /// Exporter port, when metrics are enabled
    pub metrics_port: Option<u16>,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, http_port: u16, metrics_port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            http_port,
            metrics_port,
        }
    }

    pub fn http_only(host: impl Into<String>, port: u16) -> Self {
        Self::new(host, port, None)
    }

    /// Build from the `server` and `metrics` sections of the service config
    pub fn from_config(config: &config::VolGateConfig) -> Self {
        let metrics_port = config.metrics.enabled.then_some(config.metrics.port);
        Self::new(config.server.host.clone(), config.server.http_port, metrics_port)
    }

    /// Override the HTTP port (CLI flag)
    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        self.parse_addr(self.http_port)
    }

    /// Every port this service will bind, with a label
    pub fn ports(&self) -> Vec<(&'static str, u16)> {
        let mut ports = vec![("HTTP", self.http_port)];
        if let Some(port) = self.metrics_port {
            ports.push(("metrics", port));
        }
        ports
    }

    fn parse_addr(&self, port: u16) -> Result<SocketAddr> {
        format!("{}:{}", self.host, port)
            .parse()
            .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", self.host, port)))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::http_only("0.0.0.0", ports::VOLGATE_HTTP)
    }
}
