//! HTTP API for volatility surfaces

pub mod handlers;
pub mod models;
pub mod routes;

pub use handlers::{status_for, SurfaceApiState};
pub use routes::create_router;
