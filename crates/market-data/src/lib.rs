//! FX volatility market data for VolGate
//!
//! This crate turns (pair, tenor) requests into volatility surfaces backed by
//! a reference-data upstream.
//!
//! # Core Components
//!
//! - [`ticker`] - Canonical ticker grammar and resolution
//! - [`upstream`] - Reference-data client trait, HTTP and static clients
//! - [`gateway`] - Batched, bounded, retrying upstream fetches
//! - [`assembler`] - Volatility points and smile wings from fetched quotes
//! - [`cache`] - TTL cache with in-flight fetch coalescing
//! - [`coordinator`] - Surface requests across tenors with deadlines
//! - [`api`] - HTTP endpoints (feature `api`)
//!
//! # Key Invariants
//!
//! - Data is never fabricated: a missing quote is a gap, not a default
//! - Concurrent requests for one (pair, tenor) share one upstream fetch
//! - Gaps are never cached
//! - Surface points are strictly ascending by tenor
//!
//! ```text
//!   GET /api/v1/surface
//!          │
//!          ▼
//!  SurfaceCoordinator ──► SurfaceCache ──(miss)──► TickerResolver
//!                                                      │
//!                                                      ▼
//!                                             MarketDataGateway
//!                                                      │
//!                                                      ▼
//!                                            ReferenceDataClient
//! ```

pub mod assembler;
pub mod cache;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod ticker;
pub mod types;
pub mod upstream;

#[cfg(feature = "api")]
pub mod api;

pub use cache::{CacheStats, EntryState, SurfaceCache};
pub use coordinator::{SurfaceCoordinator, SurfaceSettings};
pub use error::MarketDataError;
pub use gateway::{FetchResult, GatewayConfig, MarketDataGateway, TickerFailure};
pub use ticker::{resolve, TickerResolver, TickerSpec};
pub use types::{
    CurrencyPair, Delta, Gap, GapReason, ProductKind, QuoteField, SmilePoint, Tenor,
    VolatilityPoint, VolatilitySurface,
};
pub use upstream::{ReferenceDataClient, StaticReferenceDataClient, UpstreamError};

#[cfg(feature = "client")]
pub use upstream::http::HttpReferenceDataClient;

pub type Result<T> = std::result::Result<T, MarketDataError>;
