//! Reusable stage implementations for chains served over axum.
//!
//! - [`extract`]: parse stages (JSON bodies, path and query parameters)
//! - [`auth`]: bearer-token authorize stage
//! - [`render`]: JSON on-success and on-error stages
//! - [`observe`]: `metrics` monitor and `tracing` audit stages
//! - [`error`]: the error type these stages share

pub mod auth;
pub mod error;
pub mod extract;
pub mod observe;
pub mod render;

pub use auth::BearerAuth;
pub use error::{ensure_live, run_bounded, ApiError};
pub use extract::{parse_empty, parse_json, parse_validated_json, Validate};
pub use observe::{audit_log, record_metrics};
pub use render::{render_empty, render_error, render_json};
