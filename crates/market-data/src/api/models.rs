//! API request/response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::cache::EntryState;
use crate::ticker::TickerSpec;
use crate::types::{Delta, GapReason, ProductKind, SmilePoint, Tenor, VolatilityPoint, VolatilitySurface};

// ==================== Requests ====================

/// Query for `GET /api/v1/surface`
#[derive(Debug, Default, Deserialize)]
pub struct SurfaceQuery {
    pub pair: Option<String>,
    /// Comma-separated, e.g. `1M,3M,6M`
    pub tenors: Option<String>,
    pub max_age_secs: Option<u64>,
    pub deadline_ms: Option<u64>,
}

/// Query for `GET /api/v1/tickers`
#[derive(Debug, Default, Deserialize)]
pub struct TickersQuery {
    pub pair: Option<String>,
    pub tenor: Option<String>,
}

// ==================== Responses ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointResponse {
    pub tenor: Tenor,
    pub atm: f64,
    pub risk_reversals: BTreeMap<Delta, f64>,
    pub butterflies: BTreeMap<Delta, f64>,
    pub smile: Vec<SmilePoint>,
    pub as_of: DateTime<Utc>,
}

impl From<VolatilityPoint> for PointResponse {
    fn from(point: VolatilityPoint) -> Self {
        Self {
            smile: point.smile(),
            tenor: point.tenor,
            atm: point.atm,
            risk_reversals: point.risk_reversals,
            butterflies: point.butterflies,
            as_of: point.as_of,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceResponse {
    pub pair: String,
    pub as_of: DateTime<Utc>,
    pub points: Vec<PointResponse>,
    pub gaps: Vec<Tenor>,
    pub gap_reasons: BTreeMap<Tenor, GapReason>,
    pub deadline_exceeded: bool,
}

impl From<VolatilitySurface> for SurfaceResponse {
    fn from(surface: VolatilitySurface) -> Self {
        Self {
            pair: surface.pair.to_string(),
            as_of: surface.as_of,
            gaps: surface.gaps.iter().map(|g| g.tenor).collect(),
            gap_reasons: surface.gaps.iter().map(|g| (g.tenor, g.reason)).collect(),
            points: surface.points.into_iter().map(PointResponse::from).collect(),
            deadline_exceeded: surface.deadline_exceeded,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TickerResponse {
    pub ticker: String,
    pub kind: ProductKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<Delta>,
}

impl From<&TickerSpec> for TickerResponse {
    fn from(spec: &TickerSpec) -> Self {
        Self {
            ticker: spec.ticker(),
            kind: spec.kind,
            delta: spec.delta,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickersResponse {
    pub pair: String,
    pub tenor: Tenor,
    pub tickers: Vec<TickerResponse>,
    pub cache_state: EntryState,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
    pub removed: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}
