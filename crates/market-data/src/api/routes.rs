//! HTTP routes for the surface API

use axum::{
    routing::{delete, get},
    Router,
};
use std::sync::Arc;

use super::handlers::*;
use crate::coordinator::SurfaceCoordinator;

/// Create the surface router
///
/// Routes:
/// - GET    /api/v1/surface       - Assembled volatility surface
/// - GET    /api/v1/tickers       - Canonical tickers for a (pair, tenor)
/// - GET    /api/v1/cache/stats   - Cache statistics
/// - DELETE /api/v1/cache         - Invalidate every entry
/// - DELETE /api/v1/cache/:pair   - Invalidate one pair
pub fn create_router(coordinator: SurfaceCoordinator) -> Router {
    let state = Arc::new(SurfaceApiState::new(coordinator));

    Router::new()
        .route("/api/v1/surface", get(get_surface))
        .route("/api/v1/tickers", get(get_tickers))
        .route("/api/v1/cache/stats", get(get_cache_stats))
        .route("/api/v1/cache", delete(invalidate_all))
        .route("/api/v1/cache/:pair", delete(invalidate_pair))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SurfaceSettings;
    use crate::gateway::{GatewayConfig, MarketDataGateway};
    use crate::types::Delta;
    use crate::upstream::StaticReferenceDataClient;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn router(client: StaticReferenceDataClient) -> Router {
        let gateway = Arc::new(MarketDataGateway::new(Arc::new(client), GatewayConfig::default()));
        let settings = SurfaceSettings {
            deltas: vec![Delta::new(25).unwrap()],
            ..SurfaceSettings::default()
        };
        create_router(SurfaceCoordinator::new(gateway, settings))
    }

    fn eurusd_1m() -> StaticReferenceDataClient {
        StaticReferenceDataClient::new()
            .with_quote("EURUSDV1M Curncy", 7.54)
            .with_quote("EURUSD25R1M Curncy", 0.04)
            .with_quote("EURUSD25B1M Curncy", 0.18)
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_surface_ok() {
        let (status, body) = send(router(eurusd_1m()), "GET", "/api/v1/surface?pair=EURUSD&tenors=1M").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pair"], "EURUSD");
        assert_eq!(body["points"][0]["tenor"], "1M");
        assert_eq!(body["points"][0]["atm"], 7.54);
        assert_eq!(body["points"][0]["riskReversals"]["25"], 0.04);
        assert_eq!(body["points"][0]["butterflies"]["25"], 0.18);
        assert_eq!(body["points"][0]["smile"][0]["delta"], 25);
        assert_eq!(body["gaps"], serde_json::json!([]));
        assert_eq!(body["deadlineExceeded"], false);
    }

    #[tokio::test]
    async fn test_surface_with_gap() {
        let (status, body) =
            send(router(eurusd_1m()), "GET", "/api/v1/surface?pair=eur/usd&tenors=1M,3M").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["points"].as_array().unwrap().len(), 1);
        assert_eq!(body["gaps"], serde_json::json!(["3M"]));
        assert_eq!(body["gapReasons"]["3M"], "missing_atm");
    }

    #[tokio::test]
    async fn test_surface_invalid_spec() {
        let app = router(eurusd_1m());

        let (status, body) = send(app.clone(), "GET", "/api/v1/surface?pair=EURUSD&tenors=5Y").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "InvalidSpec");

        let (status, _) = send(app.clone(), "GET", "/api/v1/surface?tenors=1M").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(app.clone(), "GET", "/api/v1/surface?pair=EURUSD&deadline_ms=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(app.clone(), "GET", "/api/v1/surface?pair=EURUSD&deadline_ms=soon").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "InvalidSpec");

        let (status, body) = send(app, "GET", "/api/v1/surface?pair=EURUSD&max_age_secs=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "InvalidSpec");
    }

    #[tokio::test]
    async fn test_surface_incomplete() {
        let (status, body) =
            send(router(StaticReferenceDataClient::new()), "GET", "/api/v1/surface?pair=EURUSD&tenors=1M").await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "IncompleteSurface");
        assert_eq!(body["error"]["details"]["gapReasons"]["1M"], "missing_atm");
    }

    #[tokio::test(start_paused = true)]
    async fn test_surface_unavailable() {
        let (status, body) =
            send(router(eurusd_1m().with_unavailable()), "GET", "/api/v1/surface?pair=EURUSD&tenors=1M").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "UpstreamUnavailable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_surface_deadline_exceeded() {
        let client = eurusd_1m()
            .with_quote("EURUSDV3M Curncy", 7.9)
            .with_slow_security("EURUSDV3M Curncy", Duration::from_secs(3));

        let (status, body) = send(
            router(client),
            "GET",
            "/api/v1/surface?pair=EURUSD&tenors=1M,3M&deadline_ms=500",
        )
        .await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["deadlineExceeded"], true);
        assert_eq!(body["points"].as_array().unwrap().len(), 1);
        assert_eq!(body["gapReasons"]["3M"], "deadline_exceeded");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_tenor_without_deadline_is_timeout_gap() {
        let client = eurusd_1m()
            .with_quote("EURUSDV6M Curncy", 8.1)
            .with_slow_security("EURUSDV6M Curncy", Duration::from_secs(30));
        let gateway = Arc::new(MarketDataGateway::new(Arc::new(client), GatewayConfig::default()));
        let app = create_router(SurfaceCoordinator::new(gateway, SurfaceSettings::default()));

        let (status, body) = send(app, "GET", "/api/v1/surface?pair=EURUSD&tenors=1M,6M").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deadlineExceeded"], false);
        assert_eq!(body["points"][0]["tenor"], "1M");
        assert_eq!(body["gaps"], serde_json::json!(["6M"]));
        assert_eq!(body["gapReasons"]["6M"], "timeout");
    }

    #[tokio::test]
    async fn test_tickers() {
        let (status, body) = send(router(eurusd_1m()), "GET", "/api/v1/tickers?pair=EURUSD&tenor=1M").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tickers"][0]["ticker"], "EURUSDV1M Curncy");
        assert_eq!(body["tickers"][0]["kind"], "atm");
        assert_eq!(body["tickers"][1]["ticker"], "EURUSD25R1M Curncy");
        assert_eq!(body["tickers"][2]["ticker"], "EURUSD25B1M Curncy");
        assert_eq!(body["cacheState"], "empty");
    }

    #[tokio::test]
    async fn test_cache_endpoints() {
        let app = router(eurusd_1m());

        let (status, _) = send(app.clone(), "GET", "/api/v1/surface?pair=EURUSD&tenors=1M").await;
        assert_eq!(status, StatusCode::OK);

        let (_, stats) = send(app.clone(), "GET", "/api/v1/cache/stats").await;
        assert_eq!(stats["entries"], 1);
        assert_eq!(stats["misses"], 1);

        let (status, body) = send(app.clone(), "DELETE", "/api/v1/cache/EURUSD").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 1);

        let (_, body) = send(app.clone(), "DELETE", "/api/v1/cache").await;
        assert_eq!(body["removed"], 0);

        let (status, _) = send(app, "DELETE", "/api/v1/cache/EUR").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
