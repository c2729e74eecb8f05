//! HTTP middleware stack wrapped around every route.
//!
//! Layers are listed outer-to-inner: the first layer processes the request
//! first on the way in and the response last on the way out.

use axum::http::header::HeaderName;
use axum::http::Method;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;
use super::context::ContextLayer;

type Stack<Inner, Outer> = tower::layer::util::Stack<Inner, Outer>;

/// The composed layer type produced by [`build_http_layers`], innermost first.
type HttpLayers = Stack<
    ContextLayer,
    Stack<
        PropagateRequestIdLayer,
        Stack<
            CorsLayer,
            Stack<
                CompressionLayer,
                Stack<
                    TraceLayer<
                        tower_http::classify::SharedClassifier<
                            tower_http::classify::ServerErrorsAsFailures,
                        >,
                    >,
                    Stack<SetRequestIdLayer<MakeRequestUuid>, tower::layer::util::Identity>,
                >,
            >,
        >,
    >,
>;

/// Builds the transport middleware stack.
///
/// **Ordering (outermost to innermost):**
/// 1. `SetRequestId` -- assigns a UUID `x-request-id` when the client sent none
/// 2. `Trace` -- request/response spans
/// 3. `Compression` -- gzip responses
/// 4. `CORS` -- configured origins, `GET`/`POST`/`DELETE`
/// 5. `PropagateRequestId` -- copies `x-request-id` onto the response
/// 6. `Context` -- installs the `RequestContext` the chains receive
///
/// There is no timeout layer: dropping a chain's future would skip its
/// monitor and audit stages. `request_timeout` becomes the deadline of each
/// request context instead, and stages fail on it like on any other error.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig, shutdown: CancellationToken) -> HttpLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .layer(ContextLayer::new(config, shutdown))
        .into_inner()
}

/// A `"*"` entry allows any origin; otherwise each parseable origin is listed.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::{get, get_service};
    use axum::Router;
    use handle_chain::{
        BoxError, Chain, EmptyRequest, EmptyResponse, RequestContext, SuccessResponse,
    };
    use http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::network::context::RequestId;
    use crate::stages::{render_empty, render_error, run_bounded, ApiError};

    #[tokio::test]
    async fn request_id_reaches_context_and_response() {
        let config = NetworkConfig {
            request_timeout: Duration::from_secs(5),
            ..NetworkConfig::default()
        };
        let app = Router::new()
            .route(
                "/id",
                get(|req: Request<Body>| async move {
                    req.extensions()
                        .get::<RequestContext>()
                        .and_then(|ctx| ctx.value::<RequestId>())
                        .map(|id| id.0.clone())
                        .unwrap_or_default()
                }),
            )
            .layer(build_http_layers(&config, CancellationToken::new()));

        let resp = app
            .oneshot(Request::builder().uri("/id").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = resp.headers()["x-request-id"].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(!header.is_empty());
        assert_eq!(body, header.as_bytes());
    }

    /// Counts monitor and audit calls of a chain served behind the stack.
    #[derive(Default)]
    struct Terminals {
        monitor: AtomicUsize,
        audit: AtomicUsize,
    }

    fn slow_chain(terminals: &Arc<Terminals>, bounded: bool) -> Chain<EmptyRequest, EmptyResponse> {
        let (m, a) = (Arc::clone(terminals), Arc::clone(terminals));
        Chain::new()
            .resolve(move |ctx, _req| async move {
                let work = async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Ok::<_, ApiError>(SuccessResponse::ok(EmptyResponse))
                };
                if bounded {
                    run_bounded(&ctx, work).await.map_err(BoxError::from)
                } else {
                    work.await.map_err(BoxError::from)
                }
            })
            .on_success(render_empty)
            .on_error(render_error)
            .monitor(move |_ctx, _req, _err| {
                m.monitor.fetch_add(1, Ordering::SeqCst);
            })
            .audit(move |_ctx, _req, _err| {
                a.audit.fetch_add(1, Ordering::SeqCst);
            })
    }

    async fn serve_slow(bounded: bool) -> (StatusCode, Arc<Terminals>) {
        let config = NetworkConfig {
            request_timeout: Duration::from_millis(50),
            ..NetworkConfig::default()
        };
        let terminals = Arc::new(Terminals::default());
        let app = Router::new()
            .route("/slow", get_service(slow_chain(&terminals, bounded)))
            .layer(build_http_layers(&config, CancellationToken::new()));

        let resp = app
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        (resp.status(), terminals)
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fails_slow_stage_and_still_runs_terminals() {
        let (status, terminals) = serve_slow(true).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(terminals.monitor.load(Ordering::SeqCst), 1);
        assert_eq!(terminals.audit.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stack_never_drops_a_running_chain() {
        let (status, terminals) = serve_slow(false).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(terminals.monitor.load(Ordering::SeqCst), 1);
        assert_eq!(terminals.audit.load(Ordering::SeqCst), 1);
    }

    async fn preflight(origins: &[&str], origin: &'static str) -> Option<String> {
        let config = NetworkConfig {
            cors_origins: origins.iter().map(ToString::to_string).collect(),
            ..NetworkConfig::default()
        };
        let app = Router::new()
            .route("/books", get(|| async { "ok" }))
            .layer(build_http_layers(&config, CancellationToken::new()));

        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/books")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        resp.headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn wildcard_cors_allows_any_origin() {
        let allowed = preflight(&["*"], "https://anywhere.test").await;
        assert_eq!(allowed.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn listed_cors_origins_are_echoed_and_others_refused() {
        let origins = ["http://localhost:3000", "https://example.com"];

        let allowed = preflight(&origins, "https://example.com").await;
        assert_eq!(allowed.as_deref(), Some("https://example.com"));

        assert_eq!(preflight(&origins, "https://evil.test").await, None);
    }
}
