//! Transport plumbing: configuration, middleware and the context layer.

pub mod config;
pub mod context;
pub mod handlers;
pub mod middleware;

pub use config::{LogFormat, NetworkConfig, ServerArgs};
pub use context::{BodyLimit, ContextLayer, RequestId, RequestStart};
pub use middleware::build_http_layers;
