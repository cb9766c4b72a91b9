//! HTTP server implementation using Axum
//!
//! Wraps a router with the standard middleware stack (request ids, tracing,
//! CORS) and runs it under the [`Server`](crate::Server) lifecycle.

use async_trait::async_trait;
use axum::Router;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::traits::Server;

/// HTTP server implementation using Axum
///
/// ```ignore
/// use server::{HttpServer, Server, ServerConfig, ShutdownController};
///
/// let shutdown = ShutdownController::with_signals();
/// let server = HttpServer::new(ServerConfig::http_only("127.0.0.1", 8087), router);
///
/// server.run(shutdown.child_token()).await?;
/// ```
#[derive(Clone)]
pub struct HttpServer {
    name: String,
    config: ServerConfig,
    router: Router,
    running: Arc<AtomicBool>,
    bound_addr: Arc<RwLock<Option<SocketAddr>>>,
}

impl HttpServer {
    /// Create a server for `router` with the middleware stack applied
    pub fn new(config: ServerConfig, router: Router) -> Self {
        Self::with_name("http", config, router)
    }

    pub fn with_name(name: impl Into<String>, config: ServerConfig, router: Router) -> Self {
        Self {
            name: name.into(),
            config,
            router: with_middleware(router),
            running: Arc::new(AtomicBool::new(false)),
            bound_addr: Arc::new(RwLock::new(None)),
        }
    }

}

/// Request id assignment and propagation, request tracing, permissive CORS
pub fn with_middleware(router: Router) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(CorsLayer::permissive()),
    )
}

#[async_trait]
impl Server for HttpServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn address(&self) -> Option<SocketAddr> {
        *self.bound_addr.read()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run(&self, shutdown_token: CancellationToken) -> Result<()> {
        let addr = self.config.http_addr()?;

        info!(server = %self.name, %addr, "Starting HTTP server");

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::bind(addr.to_string(), e))?;

        let local_addr = listener.local_addr().map_err(ServerError::Io)?;
        *self.bound_addr.write() = Some(local_addr);

        info!(%local_addr, "HTTP server listening");

        self.running.store(true, Ordering::SeqCst);

        let result = axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
                info!("HTTP server received shutdown signal");
            })
            .await;

        self.running.store(false, Ordering::SeqCst);
        *self.bound_addr.write() = None;

        match result {
            Ok(()) => {
                info!("HTTP server shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!(%e, "HTTP server error");
                Err(ServerError::Io(e))
            }
        }
    }
}
