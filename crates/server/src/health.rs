//! Health endpoints and upstream connectivity probes

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};

/// Connection status to an upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub service: String,
    pub address: String,
    pub connected: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn connected(service: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            address: address.into(),
            connected: true,
            latency_ms: None,
            error: None,
        }
    }

    fn probed(service: &str, address: &str, start: Instant, error: Option<String>) -> Self {
        Self {
            service: service.to_string(),
            address: address.to_string(),
            connected: error.is_none(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error,
        }
    }
}

/// Shared state for health checks, usually held as `Arc<HealthState>`
#[derive(Clone)]
pub struct HealthState {
    pub service_name: String,
    pub start_time: Instant,
    pub connections: Arc<tokio::sync::RwLock<Vec<ConnectionStatus>>>,
}

impl HealthState {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            start_time: Instant::now(),
            connections: Arc::new(tokio::sync::RwLock::new(Vec::new())),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub async fn update_connection(&self, status: ConnectionStatus) {
        let mut connections = self.connections.write().await;
        connections.retain(|c| c.service != status.service);
        connections.push(status);
    }

    pub async fn get_connections(&self) -> Vec<ConnectionStatus> {
        self.connections.read().await.clone()
    }

    pub async fn is_healthy(&self) -> bool {
        self.connections.read().await.iter().all(|c| c.connected)
    }
}

/// Liveness: always 200 while the process serves requests
pub async fn health_handler(State(state): State<Arc<HealthState>>) -> Json<Value> {
    let connections = state.get_connections().await;

    Json(json!({
        "status": "ok",
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "connections": connections,
    }))
}

/// Readiness: 503 while any probed upstream is down
pub async fn detailed_health_handler(
    State(state): State<Arc<HealthState>>,
) -> (StatusCode, Json<Value>) {
    let connections = state.get_connections().await;

    let all_healthy = connections.iter().all(|c| c.connected);
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let health = json!({
        "status": if all_healthy { "healthy" } else { "degraded" },
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "connections": connections,
        "healthy": all_healthy,
    });

    (status_code, Json(health))
}

/// `/health` and `/health/detailed`
pub fn health_routes(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/health/detailed", get(detailed_health_handler))
        .with_state(state)
}

/// Reusable client for connectivity checks
#[derive(Clone)]
pub struct HealthClient {
    client: reqwest::Client,
}

impl HealthClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ServerError::HttpClient)?;

        Ok(Self { client })
    }

    /// GET `{base_url}/health`; any 2xx counts as connected
    pub async fn check_http(&self, service_name: &str, base_url: &str) -> ConnectionStatus {
        let start = Instant::now();
        let health_url = format!("{}/health", base_url.trim_end_matches('/'));

        let error = match self.client.get(&health_url).send().await {
            Ok(response) if response.status().is_success() => None,
            Ok(response) => Some(format!("HTTP {}", response.status())),
            Err(e) => Some(e.to_string()),
        };
        ConnectionStatus::probed(service_name, base_url, start, error)
    }
}

/// What a probe checks: `GET {base_url}/health`
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub service: String,
    pub base_url: String,
}

/// Check `target` every `interval` and record the result in `state`
pub fn spawn_probe(
    state: Arc<HealthState>,
    client: HealthClient,
    target: ProbeTarget,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut was_connected = true;
        info!(service = %target.service, ?interval, "Starting upstream probe");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let status = client.check_http(&target.service, &target.base_url).await;

                    match (&status.error, was_connected) {
                        (Some(error), true) => warn!(service = %status.service, %error, "Upstream probe failed"),
                        (None, false) => info!(service = %status.service, "Upstream probe recovered"),
                        _ => debug!(service = %status.service, latency_ms = ?status.latency_ms, "Upstream probe"),
                    }
                    was_connected = status.connected;
                    state.update_connection(status).await;
                }
            }
        }

        debug!(service = %target.service, "Upstream probe stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn upstream(connected: bool) -> ConnectionStatus {
        ConnectionStatus {
            service: "upstream".to_string(),
            address: "http://127.0.0.1:9000".to_string(),
            connected,
            latency_ms: Some(10),
            error: (!connected).then(|| "Connection refused".to_string()),
        }
    }

    async fn closed_base_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_health_state() {
        let state = HealthState::new("volgate");

        assert_eq!(state.service_name, "volgate");
        assert!(state.is_healthy().await);

        state.update_connection(upstream(true)).await;
        assert!(state.is_healthy().await);

        state.update_connection(upstream(false)).await;
        assert!(!state.is_healthy().await);
        assert_eq!(state.get_connections().await.len(), 1);

        state.update_connection(ConnectionStatus::connected("upstream", "static")).await;
        assert!(state.is_healthy().await);
        assert_eq!(state.get_connections().await[0].address, "static");
    }

    #[tokio::test]
    async fn test_detailed_health_degraded() {
        let state = Arc::new(HealthState::new("volgate"));
        let app = health_routes(state.clone());

        let request = || Request::get("/health/detailed").body(Body::empty()).unwrap();

        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        state.update_connection(upstream(false)).await;
        let response = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_check_http() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/", listener.local_addr().unwrap());
        let app = health_routes(Arc::new(HealthState::new("bridge")));
        let server = tokio::spawn(async move { axum::serve(listener, app).await });

        let client = HealthClient::new(Duration::from_secs(1)).unwrap();
        let status = client.check_http("upstream", &base_url).await;
        assert!(status.connected, "{:?}", status.error);
        assert!(status.latency_ms.is_some());

        let status = client.check_http("upstream", &closed_base_url().await).await;
        assert!(!status.connected);
        assert!(status.error.is_some());

        server.abort();
    }

    #[tokio::test]
    async fn test_probe_records_status() {
        let state = Arc::new(HealthState::new("volgate"));
        let client = HealthClient::new(Duration::from_millis(200)).unwrap();
        let token = CancellationToken::new();

        let handle = spawn_probe(
            state.clone(),
            client,
            ProbeTarget {
                service: "upstream".to_string(),
                base_url: closed_base_url().await,
            },
            Duration::from_secs(60),
            token.clone(),
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!state.is_healthy().await);

        token.cancel();
        handle.await.unwrap();
    }
}
