//! API handlers for the surface endpoints

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use observability::{HttpMetrics, RequestMetricsGuard};
use std::sync::Arc;
use std::time::Duration;

use crate::api::models::*;
use crate::cache::CacheStats;
use crate::coordinator::SurfaceCoordinator;
use crate::error::MarketDataError;
use crate::types::{CurrencyPair, Tenor};

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub struct SurfaceApiState {
    pub coordinator: SurfaceCoordinator,
    pub surface_metrics: HttpMetrics,
}

impl SurfaceApiState {
    pub fn new(coordinator: SurfaceCoordinator) -> Self {
        Self {
            coordinator,
            surface_metrics: HttpMetrics::new("surface"),
        }
    }
}

/// HTTP status for a market data error
pub fn status_for(error: &MarketDataError) -> StatusCode {
    match error {
        MarketDataError::InvalidSpec(_) => StatusCode::BAD_REQUEST,
        MarketDataError::IncompleteSurface { .. } | MarketDataError::PartialFailure { .. } => {
            StatusCode::BAD_GATEWAY
        }
        MarketDataError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        MarketDataError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn api_error(error: MarketDataError) -> ApiError {
    let status = status_for(&error);
    let mut body = ErrorResponse::new(error.code(), error.to_string());
    if let MarketDataError::IncompleteSurface { gaps, .. } = &error {
        let reasons: serde_json::Map<String, serde_json::Value> = gaps
            .iter()
            .map(|g| (g.tenor.to_string(), serde_json::Value::String(g.reason.to_string())))
            .collect();
        body = body.with_details(serde_json::json!({ "gapReasons": reasons }));
    }
    (status, Json(body))
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ApiError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| api_error(MarketDataError::invalid_spec(format!("missing '{}' parameter", name))))
}

/// Surface handler
///
/// 200 with at least one point, 504 with the partial body when the
/// deadline passed first.
pub async fn get_surface(
    State(state): State<Arc<SurfaceApiState>>,
    query: Result<Query<SurfaceQuery>, QueryRejection>,
) -> Result<(StatusCode, Json<SurfaceResponse>), ApiError> {
    let mut guard = RequestMetricsGuard::new(&state.surface_metrics);

    let result = match query {
        Ok(Query(query)) => surface(&state.coordinator, &query).await,
        Err(rejection) => Err(api_error(MarketDataError::invalid_spec(rejection.body_text()))),
    };
    guard.set_status(match &result {
        Ok((status, _)) | Err((status, _)) => status.as_u16(),
    });

    result
}

async fn surface(
    coordinator: &SurfaceCoordinator,
    query: &SurfaceQuery,
) -> Result<(StatusCode, Json<SurfaceResponse>), ApiError> {
    let pair = CurrencyPair::parse(required(&query.pair, "pair")?).map_err(api_error)?;
    let tenors = match &query.tenors {
        Some(list) => Tenor::parse_list(list).map_err(api_error)?,
        None => Vec::new(),
    };

    let settings = coordinator.settings();
    let max_age = query
        .max_age_secs
        .map(Duration::from_secs)
        .unwrap_or(settings.default_max_age);
    let deadline = match query.deadline_ms {
        Some(0) => {
            return Err(api_error(MarketDataError::invalid_spec(
                "deadline_ms must be positive",
            )))
        }
        Some(ms) => Some(Duration::from_millis(ms)),
        None => settings.request_deadline,
    };

    let surface = coordinator
        .get_surface_with_deadline(&pair, &tenors, max_age, deadline)
        .await
        .map_err(api_error)?;

    let status = if surface.deadline_exceeded {
        StatusCode::GATEWAY_TIMEOUT
    } else {
        StatusCode::OK
    };
    Ok((status, Json(SurfaceResponse::from(surface))))
}

/// Resolved tickers for one (pair, tenor)
pub async fn get_tickers(
    State(state): State<Arc<SurfaceApiState>>,
    Query(query): Query<TickersQuery>,
) -> Result<Json<TickersResponse>, ApiError> {
    let pair = CurrencyPair::parse(required(&query.pair, "pair")?).map_err(api_error)?;
    let tenor = Tenor::parse(required(&query.tenor, "tenor")?).map_err(api_error)?;

    let coordinator = &state.coordinator;
    let tickers = coordinator
        .resolver()
        .surface_tickers(&pair, tenor)
        .iter()
        .map(TickerResponse::from)
        .collect();

    Ok(Json(TickersResponse {
        cache_state: coordinator.entry_state(&pair, tenor),
        pair: pair.to_string(),
        tenor,
        tickers,
    }))
}

pub async fn get_cache_stats(State(state): State<Arc<SurfaceApiState>>) -> Json<CacheStats> {
    Json(state.coordinator.stats())
}

pub async fn invalidate_all(State(state): State<Arc<SurfaceApiState>>) -> Json<InvalidateResponse> {
    let removed = state.coordinator.invalidate_all();
    Json(InvalidateResponse {
        success: true,
        pair: None,
        removed,
    })
}

pub async fn invalidate_pair(
    State(state): State<Arc<SurfaceApiState>>,
    Path(pair): Path<String>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let pair = CurrencyPair::parse(&pair).map_err(api_error)?;
    let removed = state.coordinator.invalidate_pair(&pair);

    Ok(Json(InvalidateResponse {
        success: true,
        pair: Some(pair.to_string()),
        removed,
    }))
}
