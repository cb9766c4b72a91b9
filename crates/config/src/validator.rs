use crate::*;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error("Service name is required")]
    MissingServiceName,

    #[error("Server: {message}")]
    InvalidServer { message: String },

    #[error("Upstream: {message}")]
    InvalidUpstream { message: String },

    #[error("Cache: {message}")]
    InvalidCache { message: String },

    #[error("Surface: {message}")]
    InvalidSurface { message: String },

    #[error("Invalid log format: {0}. Must be one of: pretty, json, compact")]
    InvalidLogFormat(String),

    #[error("Metrics: {message}")]
    InvalidMetrics { message: String },

    #[error("{field} must be a positive integer")]
    InvalidPositiveInteger { field: String },

    #[error("Environment variable '{var}' is missing or invalid: {message}")]
    InvalidEnvVar { var: String, message: String },
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            defaults_applied: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_default(&mut self, field: &str, value: &str) {
        self.defaults_applied.push(DefaultApplied {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn validate_config(config: &VolGateConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_service(config, &mut report);
    validate_upstream(&config.upstream, config.service.environment, &mut report);
    validate_cache(&config.cache, &mut report);
    validate_surface(&config.surface, &config.cache, &config.upstream, &mut report);
    validate_observability(config, &mut report);

    report
}

fn validate_service(config: &VolGateConfig, report: &mut ValidationReport) {
    if config.service.name.trim().is_empty() {
        report.add_error(ValidationError::MissingServiceName);
    }

    if config.server.host.is_empty() {
        report.add_error(ValidationError::InvalidServer {
            message: "host is required".to_string(),
        });
    }

    if config.server.http_port == 0 {
        report.add_error(ValidationError::InvalidPositiveInteger {
            field: "server.http_port".to_string(),
        });
    } else if config.server.http_port == default_http_port() {
        report.add_default("server.http_port", &default_http_port().to_string());
    }
}

fn validate_upstream(upstream: &UpstreamConfig, environment: Environment, report: &mut ValidationReport) {
    match upstream.kind {
        UpstreamKind::Http => match upstream.endpoint.as_deref() {
            None | Some("") => report.add_error(ValidationError::InvalidUpstream {
                message: "endpoint is required when kind is http".to_string(),
            }),
            Some(endpoint) if has_unresolved_env_vars(endpoint) => {
                report.add_error(ValidationError::InvalidEnvVar {
                    var: endpoint.to_string(),
                    message: "upstream.endpoint was not substituted".to_string(),
                })
            }
            Some(endpoint) => {
                let url_regex = Regex::new(r"^https?://[^\s/]+").ok();
                if url_regex.map_or(false, |re| !re.is_match(endpoint)) {
                    report.add_error(ValidationError::InvalidUpstream {
                        message: format!("endpoint must be an http(s) URL, got: {}", endpoint),
                    });
                }
            }
        },
        UpstreamKind::Static => {
            if upstream.static_quotes.is_empty() {
                report.add_warning(
                    "upstream.static_quotes",
                    "Static upstream has no quotes; every surface request will report gaps",
                );
            }
            if environment == Environment::Prod {
                report.add_warning(
                    "upstream.kind",
                    "Static upstream configured in prod environment",
                );
            }
        }
    }

    if environment == Environment::Static && upstream.kind != UpstreamKind::Static {
        report.add_error(ValidationError::InvalidUpstream {
            message: "static environment requires upstream.kind: static".to_string(),
        });
    }

    if let Some(key) = upstream.api_key.as_deref() {
        if has_unresolved_env_vars(key) {
            report.add_warning(
                "upstream.api_key",
                "API key placeholder was not substituted; requests will be sent without it",
            );
        }
    }

    if upstream.field.trim().is_empty() {
        report.add_error(ValidationError::InvalidUpstream {
            message: "field is required".to_string(),
        });
    }

    for (field, value) in [
        ("upstream.timeout_ms", upstream.timeout_ms),
        ("upstream.max_batch_size", upstream.max_batch_size as u64),
        ("upstream.max_concurrency", upstream.max_concurrency as u64),
    ] {
        if value == 0 {
            report.add_error(ValidationError::InvalidPositiveInteger {
                field: field.to_string(),
            });
        }
    }

    if upstream.max_concurrency > 32 {
        report.add_warning(
            "upstream.max_concurrency",
            "High parallelism may exceed the terminal's request rate limits",
        );
    }

    if upstream.retry_backoff_ms >= upstream.timeout_ms && upstream.timeout_ms > 0 {
        report.add_warning(
            "upstream.retry_backoff_ms",
            "Retry backoff is not shorter than the request timeout",
        );
    }
}

fn validate_cache(cache: &CacheConfig, report: &mut ValidationReport) {
    if cache.ttl_seconds == 0 {
        report.add_error(ValidationError::InvalidCache {
            message: "ttl_seconds must be a positive integer".to_string(),
        });
    }

    if cache.sweep_interval_seconds == 0 {
        report.add_error(ValidationError::InvalidCache {
            message: "sweep_interval_seconds must be a positive integer".to_string(),
        });
    }
}

fn validate_surface(
    surface: &SurfaceConfig,
    cache: &CacheConfig,
    upstream: &UpstreamConfig,
    report: &mut ValidationReport,
) {
    if surface.deltas.is_empty() {
        report.add_warning(
            "surface.deltas",
            "No deltas configured; surfaces will carry ATM volatility only",
        );
    }

    if surface.default_tenors.is_empty() {
        report.add_error(ValidationError::InvalidSurface {
            message: "default_tenors must not be empty".to_string(),
        });
    }

    // A hung ticker costs two timeouts plus the backoff before it becomes a gap
    let worst_fetch_ms = upstream
        .timeout_ms
        .saturating_mul(2)
        .saturating_add(upstream.retry_backoff_ms);
    if surface.request_deadline_ms > 0 && surface.request_deadline_ms < worst_fetch_ms {
        report.add_warning(
            "surface.request_deadline_ms",
            &format!(
                "Deadline is shorter than a retried upstream timeout ({}ms); slow tenors will answer 504 instead of reporting a timeout gap",
                worst_fetch_ms
            ),
        );
    }

    if surface.default_max_age_seconds > cache.ttl_seconds {
        report.add_warning(
            "surface.default_max_age_seconds",
            "Entries are evicted at cache.ttl_seconds, so a longer max age has no effect",
        );
    }
}

fn validate_observability(config: &VolGateConfig, report: &mut ValidationReport) {
    let valid_formats = ["pretty", "json", "compact"];
    if !valid_formats.contains(&config.logging.format.to_lowercase().as_str()) {
        report.add_error(ValidationError::InvalidLogFormat(config.logging.format.clone()));
    }

    if config.metrics.enabled {
        if config.metrics.port == 0 {
            report.add_error(ValidationError::InvalidPositiveInteger {
                field: "metrics.port".to_string(),
            });
        } else if config.metrics.port == config.server.http_port {
            report.add_error(ValidationError::InvalidMetrics {
                message: format!("port {} collides with server.http_port", config.metrics.port),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn http_config() -> VolGateConfig {
        let mut config = generate_default_config();
        config.upstream.endpoint = Some("http://localhost:8194".to_string());
        config.upstream.api_key = None;
        config
    }

    #[test]
    fn test_default_http_config_is_valid() {
        let report = validate_config(&http_config());
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn test_unsubstituted_endpoint_is_rejected() {
        let mut config = http_config();
        config.upstream.endpoint = Some("${VOLGATE_VALIDATOR_UNSET}".to_string());

        let report = validate_config(&config);
        assert!(!report.is_valid());
        assert_matches!(report.errors[0], ValidationError::InvalidEnvVar { .. });
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let mut config = http_config();
        config.upstream.timeout_ms = 0;
        config.upstream.max_concurrency = 0;
        config.cache.ttl_seconds = 0;

        let report = validate_config(&config);
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn test_static_environment_requires_static_upstream() {
        let mut config = http_config();
        config.service.environment = Environment::Static;

        let report = validate_config(&config);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidUpstream { .. })));
    }

    #[test]
    fn test_static_upstream_without_quotes_warns() {
        let mut config = http_config();
        config.service.environment = Environment::Static;
        config.upstream.kind = UpstreamKind::Static;

        let report = validate_config(&config);
        assert!(report.is_valid());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.field == "upstream.static_quotes"));
    }

    #[test]
    fn test_metrics_port_collision() {
        let mut config = http_config();
        config.metrics.enabled = true;
        config.metrics.port = config.server.http_port;

        let report = validate_config(&config);
        assert_matches!(report.errors[0], ValidationError::InvalidMetrics { .. });
    }

    #[test]
    fn test_request_deadline_shorter_than_retried_timeout_warns() {
        let mut config = http_config();
        assert_eq!(config.surface.request_deadline_ms, 0);
        assert!(!validate_config(&config)
            .warnings
            .iter()
            .any(|w| w.field == "surface.request_deadline_ms"));

        config.upstream.timeout_ms = 5_000;
        config.upstream.retry_backoff_ms = 250;
        config.surface.request_deadline_ms = 10_000;

        let report = validate_config(&config);
        assert!(report.is_valid());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.field == "surface.request_deadline_ms"));

        config.surface.request_deadline_ms = 10_250;
        assert!(!validate_config(&config)
            .warnings
            .iter()
            .any(|w| w.field == "surface.request_deadline_ms"));
    }

    #[test]
    fn test_unknown_log_format() {
        let mut config = http_config();
        config.logging.format = "xml".to_string();

        let report = validate_config(&config);
        assert_matches!(report.errors[0], ValidationError::InvalidLogFormat(_));
    }
}
