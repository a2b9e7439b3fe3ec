//! HTTP surface for the review pipeline: route handlers, error mapping,
//! and service configuration. The `covenant` binary wires the storage and
//! engine adapters into the lifecycle controller and serves this router.

pub mod config;
pub mod error;
pub mod routes;

pub use config::Config;
pub use error::ApiError;
pub use routes::{AppState, build_router};
