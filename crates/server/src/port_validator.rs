//! Port validation utilities
//!
//! Checking before binding is racy: another process can take the port in
//! between. The check gives early feedback at startup; the real bind decides.

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

/// Probe every port in `config` by binding and releasing it
pub async fn validate_ports_available(config: &ServerConfig) -> Result<()> {
    info!("Validating server ports...");

    for (label, port) in config.ports() {
        validate_single_port(&config.host, port, label).await?;
    }

    info!("All server ports validated successfully");
    Ok(())
}

async fn validate_single_port(host: &str, port: u16, label: &str) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    debug!("Checking {} port {}", label, port);

    match TcpListener::bind(&addr).await {
        Ok(listener) => {
            let local_addr = listener
                .local_addr()
                .map_err(|e| ServerError::bind(addr.clone(), e))?;
            drop(listener);

            info!("{} port {} is available ({})", label, port, local_addr);
            Ok(())
        }
        Err(e) => {
            error!("{} port {} is NOT available: {}", label, port, e);
            Err(ServerError::port_in_use(port, e.to_string()))
        }
    }
}

/// Reject port 0, warn on privileged ports
pub fn validate_port_range(port: u16) -> Result<()> {
    if port == 0 {
        Err(ServerError::ConfigError(
            "Port cannot be 0 (ephemeral port assignment not supported for explicit binding)"
                .to_string(),
        ))
    } else {
        if port < 1024 {
            warn!("Port {} is a privileged port (requires root/admin privileges)", port);
        }
        Ok(())
    }
}

/// Range-check every port in `config`, and require distinct ports
pub fn validate_config_ports(config: &ServerConfig) -> Result<()> {
    let ports = config.ports();
    for (_, port) in &ports {
        validate_port_range(*port)?;
    }
    if let [(_, http), (_, metrics)] = ports.as_slice() {
        if http == metrics {
            return Err(ServerError::ConfigError(format!(
                "HTTP and metrics ports must differ (both {})",
                http
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_port_range() {
        assert!(validate_port_range(0).is_err());
        assert!(validate_port_range(80).is_ok());
        assert!(validate_port_range(8087).is_ok());
        assert!(validate_port_range(65535).is_ok());
    }

    #[test]
    fn test_validate_config_ports() {
        assert!(validate_config_ports(&ServerConfig::default()).is_ok());
        assert!(validate_config_ports(&ServerConfig::new("0.0.0.0", 8087, Some(9187))).is_ok());
        assert!(validate_config_ports(&ServerConfig::new("0.0.0.0", 8087, Some(8087))).is_err());
        assert!(validate_config_ports(&ServerConfig::http_only("0.0.0.0", 0)).is_err());
    }

    #[tokio::test]
    async fn test_validate_ports_available() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let config = ServerConfig::http_only("127.0.0.1", port);
        assert!(matches!(
            validate_ports_available(&config).await,
            Err(ServerError::PortInUse { .. })
        ));

        drop(listener);
        assert!(validate_ports_available(&config).await.is_ok());
    }
}
