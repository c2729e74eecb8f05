//! Plain axum handlers that do not go through a chain.

pub mod health;

pub use health::{liveness_handler, metrics_handler, readiness_handler};
