//! Server lifecycle traits
//!
//! [`Server`] is the run/inspect interface shared by listeners.

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// A long-running listener driven by a cancellation token.
///
/// # Implementors
///
/// - [`HttpServer`](crate::http::HttpServer) - Axum HTTP server
#[async_trait]
pub trait Server: Send + Sync + 'static {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Bound address, `None` until the listener is up.
    fn address(&self) -> Option<SocketAddr>;

    fn is_running(&self) -> bool;

    /// Bind, serve until `shutdown` is cancelled, then drain in-flight
    /// requests and return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound or the accept loop dies.
    async fn run(&self, shutdown: CancellationToken) -> Result<()>;
}
