//! Market data error types

use crate::gateway::TickerFailure;
use crate::types::Gap;
use thiserror::Error;

/// Errors that can occur while resolving, fetching or assembling volatility data
///
/// Ticker-level problems never surface through this type from
/// [`SurfaceCoordinator::get_surface`](crate::SurfaceCoordinator::get_surface);
/// they become gaps on the returned surface.
#[derive(Error, Debug, Clone)]
pub enum MarketDataError {
    /// Caller supplied a pair, tenor, product or delta outside the grammar
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    /// Connection-level failure talking to the reference-data upstream
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Every requested ticker timed out, including the retry
    #[error("Timeout: {} ticker(s) timed out", .tickers.len())]
    Timeout { tickers: Vec<String> },

    /// Some tickers in a logical call failed; the rest are usable
    #[error("Partial failure: {} of {total} ticker(s) failed", .failed.len())]
    PartialFailure {
        failed: Vec<TickerFailure>,
        total: usize,
    },

    /// No requested tenor produced a valid point
    #[error("Incomplete surface for {pair}: no tenor has an ATM volatility")]
    IncompleteSurface { pair: String, gaps: Vec<Gap> },
}

impl MarketDataError {
    pub fn invalid_spec(msg: impl Into<String>) -> Self {
        Self::InvalidSpec(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(msg.into())
    }

    /// Stable machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSpec(_) => "InvalidSpec",
            Self::UpstreamUnavailable(_) => "UpstreamUnavailable",
            Self::Timeout { .. } => "Timeout",
            Self::PartialFailure { .. } => "PartialFailure",
            Self::IncompleteSurface { .. } => "IncompleteSurface",
        }
    }
}
