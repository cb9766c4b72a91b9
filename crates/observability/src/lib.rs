//! Observability infrastructure for VolGate
//!
//! This crate provides:
//! - Structured logging via tracing
//! - Prometheus metrics
//! - Metric sets for upstream calls, the surface cache and the HTTP API
//!
//! # Quick Start
//!
//! ```ignore
//! use observability::{init_logging, LogFormat};
//!
//! init_logging("volgate", LogFormat::Pretty)?;
//!
//! // Optional
//! observability::metrics::init_metrics(9187)?;
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_default_logging, init_logging, LogFormat};
pub use metrics::{init_metrics, CacheMetrics, HttpMetrics, RequestMetricsGuard, UpstreamMetrics};
