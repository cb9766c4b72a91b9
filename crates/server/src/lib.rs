//! Server infrastructure for VolGate
//!
//! HTTP serving with graceful shutdown, health endpoints and upstream probes.
//!
//! # Architecture
//!
//! Listeners implement the [`Server`] trait.
//! Shutdown is driven by `CancellationToken` from
//! `tokio_util`: cancelling the root token held by [`ShutdownController`]
//! stops every child.
//!
//! # Quick Start
//!
//! ```ignore
//! use server::{HttpServer, Server, ServerConfig, ShutdownController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let shutdown = ShutdownController::with_signals();
//!     let config = ServerConfig::http_only("0.0.0.0", 8087);
//!     HttpServer::new(config, router).run(shutdown.child_token()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`] - Bind configuration and default ports
//! - [`traits`] - `Server` lifecycle trait
//! - [`http`] - Axum server and middleware stack
//! - [`health`] - Health endpoints, client and probes
//! - [`port_validator`] - Startup port checks
//! - [`shutdown`] - Signal handling

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod port_validator;
pub mod shutdown;
pub mod traits;

pub use config::{ports, ServerConfig};
pub use error::{Result, ServerError};
pub use health::{
    health_routes, spawn_probe, ConnectionStatus, HealthClient, HealthState, ProbeTarget,
};
pub use http::{with_middleware, HttpServer};
pub use port_validator::{validate_config_ports, validate_ports_available};
pub use shutdown::ShutdownController;
pub use traits::Server;
