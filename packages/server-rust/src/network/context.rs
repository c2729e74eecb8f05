//! Installs a per-request [`RequestContext`] for chains further down the stack.
//!
//! Each request gets a child of the server's shutdown token (so draining the
//! server cancels in-flight work), a deadline of `request_timeout`, and the
//! request-scoped values the stages in this crate look up.

use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use handle_chain::RequestContext;
use http::Request;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};

use super::config::NetworkConfig;

/// Value of the `x-request-id` header assigned by the outer request-id layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// When the transport received the request.
#[derive(Debug, Clone, Copy)]
pub struct RequestStart(pub Instant);

/// Maximum number of body bytes a parse stage may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLimit(pub usize);

// ---------------------------------------------------------------------------
// ContextLayer
// ---------------------------------------------------------------------------

/// Tower layer inserting a `RequestContext` into each request's extensions.
#[derive(Debug, Clone)]
pub struct ContextLayer {
    shutdown: CancellationToken,
    request_timeout: Duration,
    body_limit: BodyLimit,
}

impl ContextLayer {
    #[must_use]
    pub fn new(config: &NetworkConfig, shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            request_timeout: config.request_timeout,
            body_limit: BodyLimit(config.max_body_bytes),
        }
    }

    fn context_for<B>(&self, req: &Request<B>) -> RequestContext {
        let mut ctx = RequestContext::background()
            .with_cancellation(self.shutdown.child_token())
            .with_timeout(self.request_timeout)
            .with_value(RequestStart(Instant::now()))
            .with_value(self.body_limit);

        if let Some(id) = req
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
        {
            ctx = ctx.with_value(RequestId(id.to_string()));
        }
        ctx
    }
}

impl<S> Layer<S> for ContextLayer {
    type Service = ContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ContextService {
            inner,
            layer: self.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ContextService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ContextService<S> {
    inner: S,
    layer: ContextLayer,
}

impl<S, B> Service<Request<B>> for ContextService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let ctx = self.layer.context_for(&req);
        req.extensions_mut().insert(ctx);
        self.inner.call(req)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
