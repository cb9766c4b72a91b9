//! Configuration types for VolGate
//!
//! The service is configured from a single YAML document. Every section other
//! than `service` and `upstream` is optional and falls back to the functions
//! in [`defaults`]. `${VAR}` placeholders are substituted from the
//! environment before parsing (see [`substitution`]).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use substitution::*;
pub use validator::*;

/// Root configuration document
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VolGateConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub server: HttpConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default = "default_environment")]
    pub environment: Environment,
}

/// Deployment environment
///
/// `static` serves quotes from `upstream.static_quotes` and never talks to a
/// terminal bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Prod,
    Uat,
    Static,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Uat => "uat",
            Environment::Static => "static",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamKind {
    /// Reference-data bridge reached over HTTP
    Http,
    /// Quotes served from `static_quotes`
    Static,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    pub kind: UpstreamKind,
    /// Base URL of the bridge, required for `kind: http`
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Vendor field requested for every volatility ticker
    #[serde(default = "default_quote_field")]
    pub field: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Security -> value, used when `kind: static`
    #[serde(default)]
    pub static_quotes: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SurfaceConfig {
    /// Deltas fetched for risk reversals and butterflies
    #[serde(default = "default_deltas")]
    pub deltas: Vec<u8>,
    /// Tenors served when a request does not name any
    #[serde(default = "default_tenors")]
    pub default_tenors: Vec<String>,
    #[serde(default = "default_max_age_seconds")]
    pub default_max_age_seconds: u64,
    /// Deadline applied when a request gives none, 0 for none
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            deltas: default_deltas(),
            default_tenors: default_tenors(),
            default_max_age_seconds: default_max_age_seconds(),
            request_deadline_ms: default_request_deadline_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// pretty, json or compact
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
service:
  name: volgate
upstream:
  kind: http
  endpoint: http://localhost:8194
"#;

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config: VolGateConfig = serde_yaml::from_str(MINIMAL).unwrap();

        assert_eq!(config.service.environment, Environment::Prod);
        assert_eq!(config.server.http_port, 8087);
        assert_eq!(config.upstream.field, "PX_LAST");
        assert_eq!(config.upstream.timeout_ms, 5000);
        assert_eq!(config.upstream.max_concurrency, 8);
        assert_eq!(config.upstream.retry_backoff_ms, 250);
        assert_eq!(config.cache.ttl_seconds, 60);
        assert_eq!(config.surface.deltas, vec![25, 10]);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_static_quotes_parse() {
        let yaml = r#"
service:
  name: volgate
  environment: static
upstream:
  kind: static
  static_quotes:
    "EURUSDV1M Curncy": 7.54
    "EURUSD25R1M Curncy": 0.04
"#;
        let config: VolGateConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.upstream.kind, UpstreamKind::Static);
        assert_eq!(config.upstream.static_quotes.len(), 2);
        assert_eq!(config.upstream.static_quotes["EURUSDV1M Curncy"], 7.54);
    }
}
