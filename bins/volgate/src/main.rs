//! VolGate CLI and server binary
//!
//! Entry point for initializing, validating and starting the volatility
//! surface gateway, plus a `resolve` helper for ticker lookups.

use anyhow::{Context, Result};
use cli::{Cli, Commands, KindArg, LogFormatArg};
use config::{
    generate_default_config, load_config, save_config, validate_config, UpstreamKind,
    VolGateConfig,
};
use market_data::{
    GatewayConfig, HttpReferenceDataClient, MarketDataGateway, ProductKind, ReferenceDataClient,
    StaticReferenceDataClient, SurfaceCoordinator, SurfaceSettings,
};
use observability::{init_default_logging, init_logging, LogFormat};
use server::{
    health_routes, spawn_probe, validate_config_ports, validate_ports_available, ConnectionStatus,
    HealthClient, HealthState, HttpServer, ProbeTarget, Server, ServerConfig, ShutdownController,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SERVICE_NAME: &str = "volgate";
const PROBE_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Start {
            config,
            http,
            log_format,
        } => start_gateway(config, http, log_format).await,
        Commands::Validate { config } => {
            init_default_logging(SERVICE_NAME)?;
            validate_command(config)
        }
        Commands::Init { output } => {
            init_default_logging(SERVICE_NAME)?;
            init_command(output)
        }
        Commands::Resolve {
            pair,
            tenor,
            kind,
            delta,
        } => resolve_command(&pair, &tenor, kind, delta),
    }
}

async fn start_gateway<P: AsRef<Path>>(
    config_path: P,
    http_override: Option<u16>,
    log_format: Option<LogFormatArg>,
) -> Result<()> {
    let config = load_config(config_path.as_ref())?;

    let format = match log_format {
        Some(arg) => LogFormat::parse(arg.as_str()).unwrap_or_default(),
        None => config.logging.format.parse::<LogFormat>().unwrap_or_default(),
    };
    init_logging(&config.service.name, format)?;

    info!(
        service = %config.service.name,
        environment = config.service.environment.as_str(),
        "VolGate starting..."
    );

    let report = validate_config(&config);
    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "Configuration warning");
    }
    if !report.is_valid() {
        error!(error_count = report.errors.len(), "Configuration validation failed");
        for err in &report.errors {
            error!("{}", err);
        }
        anyhow::bail!("Cannot start gateway due to configuration errors");
    }

    let mut server_config = ServerConfig::from_config(&config);
    if let Some(port) = http_override {
        debug!(port, "Overriding HTTP port from command line");
        server_config = server_config.with_http_port(port);
    }
    validate_config_ports(&server_config)?;
    validate_ports_available(&server_config).await?;

    if let Some(port) = server_config.metrics_port {
        observability::init_metrics(port)?;
    }

    let client = build_client(&config)?;
    let gateway = Arc::new(MarketDataGateway::new(
        client,
        GatewayConfig::from(&config.upstream),
    ));
    let settings = SurfaceSettings::from_config(&config).context("Invalid surface settings")?;
    let coordinator = SurfaceCoordinator::new(gateway, settings);

    let shutdown = ShutdownController::with_signals();
    let sweeper = coordinator.spawn_sweeper(shutdown.child_token());

    let health = Arc::new(HealthState::new(config.service.name.clone()));
    let probe = match (&config.upstream.kind, &config.upstream.endpoint) {
        (UpstreamKind::Http, Some(endpoint)) => {
            let client = HealthClient::new(Duration::from_millis(config.upstream.timeout_ms))?;
            let target = ProbeTarget {
                service: "upstream".to_string(),
                base_url: endpoint.clone(),
            };
            Some(spawn_probe(
                health.clone(),
                client,
                target,
                PROBE_INTERVAL,
                shutdown.child_token(),
            ))
        }
        _ => {
            health
                .update_connection(ConnectionStatus::connected("upstream", "static"))
                .await;
            None
        }
    };

    let router = market_data::api::create_router(coordinator).merge(health_routes(health));
    let http = HttpServer::with_name(SERVICE_NAME, server_config, router);

    info!(
        upstream = ?config.upstream.kind,
        ttl_seconds = config.cache.ttl_seconds,
        "Gateway ready"
    );
    let result = http.run(shutdown.child_token()).await;

    shutdown.shutdown();
    if let Err(e) = sweeper.await {
        warn!(%e, "Cache sweeper task failed");
    }
    if let Some(probe) = probe {
        if let Err(e) = probe.await {
            warn!(%e, "Upstream probe task failed");
        }
    }

    result?;
    info!("VolGate shutdown complete");
    Ok(())
}

fn build_client(config: &VolGateConfig) -> Result<Arc<dyn ReferenceDataClient>> {
    let upstream = &config.upstream;
    match upstream.kind {
        UpstreamKind::Http => {
            let endpoint = upstream
                .endpoint
                .as_deref()
                .context("upstream.endpoint is required for kind: http")?;
            info!(%endpoint, "Using HTTP reference-data upstream");
            Ok(Arc::new(HttpReferenceDataClient::new(
                endpoint,
                upstream.api_key.clone(),
            )))
        }
        UpstreamKind::Static => {
            let client = StaticReferenceDataClient::from_quotes(&upstream.static_quotes)
                .context("Invalid upstream.static_quotes")?;
            info!(quotes = client.quote_count(), "Using static reference-data upstream");
            Ok(Arc::new(client))
        }
    }
}

fn validate_command<P: AsRef<Path>>(config_path: P) -> Result<()> {
    info!(path = ?config_path.as_ref(), "Validating configuration");

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(%e, "Failed to load configuration");
            anyhow::bail!(e);
        }
    };

    let report = validate_config(&config);

    println!("\n=== Configuration Validation Report ===\n");

    if !report.defaults_applied.is_empty() {
        println!("Defaults Applied ({}):", report.defaults_applied.len());
        for default in &report.defaults_applied {
            println!("  [info] {} = {}", default.field, default.value);
        }
        println!();
    }

    if !report.warnings.is_empty() {
        println!("Warnings ({}):", report.warnings.len());
        for warning in &report.warnings {
            println!("  [warn] [{}] {}", warning.field, warning.message);
        }
        println!();
    }

    if !report.errors.is_empty() {
        println!("Errors ({}):", report.errors.len());
        for err in &report.errors {
            println!("  [error] {}", err);
        }
        println!();
        anyhow::bail!("Configuration validation failed");
    }

    println!("[ok] Configuration is valid!");
    println!();
    println!("Service: {}", config.service.name);
    println!("Environment: {}", config.service.environment.as_str());
    println!("Upstream: {:?}", config.upstream.kind);
    println!("Deltas: {:?}", config.surface.deltas);
    println!("Default tenors: {}", config.surface.default_tenors.join(","));
    println!("Cache TTL: {}s", config.cache.ttl_seconds);

    Ok(())
}

fn init_command<P: AsRef<Path>>(output_path: P) -> Result<()> {
    let output_path = output_path.as_ref();
    info!(?output_path, "Initializing new configuration file");

    let config = generate_default_config();

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }

    save_config(&config, output_path)?;

    println!("[ok] Configuration file created successfully!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("Next steps:");
    println!("  1. Point upstream.endpoint at the reference-data bridge (or use kind: static)");
    println!("  2. Set required environment variables (API keys)");
    println!(
        "  3. Run 'volgate validate --config {:?}' to check configuration",
        output_path
    );
    println!(
        "  4. Run 'volgate start --config {:?}' to start the gateway",
        output_path
    );

    Ok(())
}

fn resolve_command(pair: &str, tenor: &str, kind: KindArg, delta: Option<u8>) -> Result<()> {
    let kind: ProductKind = kind.as_str().parse()?;
    let spec = market_data::resolve(pair, tenor, kind, delta)?;
    println!("{}", spec.ticker());
    Ok(())
}
