//! Reference-data upstream - trait and implementations
//!
//! The gateway only ever talks to a [`ReferenceDataClient`]. Production
//! deployments reach the terminal bridge over HTTP ([`http`], behind the
//! `client` feature); the static environment and the test suite use
//! [`StaticReferenceDataClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod static_client;

#[cfg(feature = "client")]
pub mod http;

pub use static_client::StaticReferenceDataClient;

/// Row-level error category for an unknown security
pub const BAD_SECURITY: &str = "BAD_SEC";

/// Row-level error category for an unknown field
pub const BAD_FIELD: &str = "BAD_FLD";

/// One reference-data request: every field for every security
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDataRequest {
    pub securities: Vec<String>,
    pub fields: Vec<String>,
}

impl ReferenceDataRequest {
    pub fn new(securities: Vec<String>, fields: Vec<String>) -> Self {
        Self { securities, fields }
    }
}

/// Error attached to a single (security, field) row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub category: String,
    #[serde(default)]
    pub message: String,
}

impl RowError {
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }

    pub fn security_not_found(security: &str) -> Self {
        Self::new(BAD_SECURITY, format!("Unknown/Invalid security {}", security))
    }

    pub fn is_security_not_found(&self) -> bool {
        self.category == BAD_SECURITY
    }
}

/// One (security, field) answer
///
/// `value: None` with no error is the vendor saying "no data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDataRow {
    pub security: String,
    pub field: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RowError>,
}

impl ReferenceDataRow {
    pub fn value(security: impl Into<String>, field: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            security: security.into(),
            field: field.into(),
            value,
            error: None,
        }
    }

    pub fn error(security: impl Into<String>, field: impl Into<String>, error: RowError) -> Self {
        Self {
            security: security.into(),
            field: field.into(),
            value: None,
            error: Some(error),
        }
    }
}

/// Wire shape of a bridge response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceDataResponse {
    #[serde(default)]
    pub data: Vec<ReferenceDataRow>,
}

/// Request-level upstream failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Upstream returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Malformed upstream response: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Whether one retry is worthwhile
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

/// Client trait for the reference-data upstream - protocol agnostic
#[async_trait]
pub trait ReferenceDataClient: Send + Sync {
    /// Short label used in logs and metrics
    fn name(&self) -> &str;

    /// Fetch every field for every security in one round trip
    ///
    /// Rows may come back in any order. A security missing from the rows
    /// is treated by the gateway as a transient miss.
    async fn reference_data(
        &self,
        request: ReferenceDataRequest,
    ) -> Result<Vec<ReferenceDataRow>, UpstreamError>;
}
