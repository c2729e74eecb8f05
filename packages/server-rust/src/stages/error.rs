//! Errors raised by the stages of this crate and their HTTP mapping.

use std::future::Future;

use axum::http::StatusCode;
use handle_chain::{BoxError, RequestContext};

/// Errors the stages of this crate return.
///
/// The chain treats them as opaque; [`render_error`](super::render_error)
/// downcasts to this type to pick a status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("missing or malformed credentials")]
    Unauthorized,
    #[error("caller may not perform this action")]
    Forbidden,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("request cancelled or past its deadline")]
    Unavailable,
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the `error` field of the body.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Unavailable => "unavailable",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Classifies any stage error: `ApiError`s keep their mapping, everything
    /// else is a 500.
    #[must_use]
    pub fn classify(err: &BoxError) -> (StatusCode, &'static str) {
        match err.downcast_ref::<ApiError>() {
            Some(api) => (api.status(), api.code()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

/// Fails fast when the invocation context is cancelled or expired.
///
/// # Errors
///
/// Returns `ApiError::Unavailable` if the context is done.
pub fn ensure_live(ctx: &RequestContext) -> Result<(), ApiError> {
    if ctx.is_done() {
        Err(ApiError::Unavailable)
    } else {
        Ok(())
    }
}

/// Runs `work` until it completes or `ctx` is cancelled or past its
/// deadline, whichever happens first.
///
/// # Errors
///
/// `ApiError::Unavailable` when the context ends first, otherwise whatever
/// `work` returns.
pub async fn run_bounded<T, F>(ctx: &RequestContext, work: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    ensure_live(ctx)?;

    let expired = async {
        match ctx.remaining() {
            Some(left) => tokio::time::sleep(left).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = work => result,
        () = ctx.cancelled() => Err(ApiError::Unavailable),
        () = expired => Err(ApiError::Unavailable),
    }
}
