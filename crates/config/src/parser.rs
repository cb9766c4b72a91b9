use crate::*;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

#[instrument(skip(path))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<VolGateConfig> {
    let path = path.as_ref();
    info!("Loading configuration from: {:?}", path);

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    debug!("Config file content length: {} bytes", content.len());

    parse_config(&content)
}

/// Parse a configuration document after environment substitution
pub fn parse_config(content: &str) -> Result<VolGateConfig> {
    let substituted = substitution::substitute_env_vars(content)?;
    debug!("Environment variable substitution completed");

    let config: VolGateConfig = serde_yaml::from_str(&substituted)
        .with_context(|| "Failed to parse YAML configuration")?;

    info!(
        service = %config.service.name,
        environment = %config.service.environment,
        "Configuration loaded successfully"
    );
    Ok(config)
}

#[instrument]
pub fn generate_default_config() -> VolGateConfig {
    VolGateConfig {
        service: ServiceConfig {
            name: "volgate".to_string(),
            environment: Environment::Prod,
        },
        server: HttpConfig::default(),
        upstream: UpstreamConfig {
            kind: UpstreamKind::Http,
            endpoint: Some("${BLOOMBERG_BRIDGE_URL}".to_string()),
            api_key: Some("${BLOOMBERG_BRIDGE_API_KEY}".to_string()),
            field: default_quote_field(),
            timeout_ms: default_timeout_ms(),
            max_batch_size: default_max_batch_size(),
            max_concurrency: default_max_concurrency(),
            retry_backoff_ms: default_retry_backoff_ms(),
            static_quotes: BTreeMap::new(),
        },
        cache: CacheConfig::default(),
        surface: SurfaceConfig::default(),
        logging: LoggingConfig::default(),
        metrics: MetricsConfig::default(),
    }
}

#[instrument]
pub fn save_config<P: AsRef<Path> + std::fmt::Debug>(config: &VolGateConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving configuration to: {:?}", path);

    let yaml = serde_yaml::to_string(config)
        .with_context(|| "Failed to serialize configuration to YAML")?;

    fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    info!("Configuration saved successfully");
    Ok(())
}
