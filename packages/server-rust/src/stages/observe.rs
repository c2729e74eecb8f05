//! Monitor and audit stages.

use handle_chain::{BoxError, ParsedRequest, RequestContext};

use super::error::ApiError;
use crate::network::{RequestId, RequestStart};

/// Outcome label: `"ok"` on success, otherwise the error code.
fn outcome(err: Option<&BoxError>) -> &'static str {
    err.map_or("ok", |e| ApiError::classify(e).1)
}

/// Monitor stage recording `chain_requests_total{endpoint,outcome}` and, when
/// the context carries a [`RequestStart`], `chain_request_duration_seconds{endpoint}`.
pub fn record_metrics<Req>(
    endpoint: &'static str,
) -> impl Fn(&RequestContext, &ParsedRequest<Req>, Option<&BoxError>) + Send + Sync + 'static
where
    Req: 'static,
{
    move |ctx: &RequestContext, _req: &ParsedRequest<Req>, err: Option<&BoxError>| {
        metrics::counter!(
            "chain_requests_total",
            "endpoint" => endpoint,
            "outcome" => outcome(err)
        )
        .increment(1);

        if let Some(start) = ctx.value::<RequestStart>() {
            metrics::histogram!("chain_request_duration_seconds", "endpoint" => endpoint)
                .record(start.0.elapsed().as_secs_f64());
        }
    }
}

/// Audit stage writing one `tracing` event per invocation on target `audit`.
pub fn audit_log<Req>(
    endpoint: &'static str,
) -> impl Fn(&RequestContext, &ParsedRequest<Req>, Option<&BoxError>) + Send + Sync + 'static
where
    Req: 'static,
{
    move |ctx: &RequestContext, req: &ParsedRequest<Req>, err: Option<&BoxError>| {
        let request_id = ctx.value::<RequestId>().map_or("-", |id| id.0.as_str());
        match err {
            None => tracing::info!(
                target: "audit",
                endpoint,
                request_id,
                path_params = ?req.path_params,
                outcome = "ok",
                "request handled"
            ),
            Some(e) => tracing::warn!(
                target: "audit",
                endpoint,
                request_id,
                path_params = ?req.path_params,
                outcome = outcome(Some(e)),
                error = %e,
                "request rejected"
            ),
        }
    }
}
