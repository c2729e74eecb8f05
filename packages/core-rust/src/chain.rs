//! The handler chain: builder and executor in one value.
//!
//! Stages always run in this order, regardless of the order they were set in:
//!
//! 1. **parse** -- raw request -> [`ParsedRequest`]
//! 2. **authorize** -- accept or reject the parsed request
//! 3. **resolve** -- business logic, produces a [`SuccessResponse`]
//! 4. **on_success** -- renders the success response
//!
//! The first failing stage short-circuits to **on_error**. **monitor** and
//! then **audit** run exactly once per invocation on both branches.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::response::Response;
use http::Request;
use tower::Service;
use tracing::Instrument;

use crate::context::RequestContext;
use crate::types::{BoxError, ParseFailure, ParsedRequest, SuccessResponse};
use crate::writer::ResponseWriter;

// ---------------------------------------------------------------------------
// Stage slots
// ---------------------------------------------------------------------------

type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type ParseFn<Req> = Arc<
    dyn Fn(RequestContext, Request<Body>) -> BoxedFuture<Result<ParsedRequest<Req>, ParseFailure<Req>>>
        + Send
        + Sync,
>;

type AuthorizeFn<Req> = Arc<
    dyn Fn(RequestContext, Arc<ParsedRequest<Req>>) -> BoxedFuture<Result<(), BoxError>> + Send + Sync,
>;

type ResolveFn<Req, Resp> = Arc<
    dyn Fn(RequestContext, Arc<ParsedRequest<Req>>) -> BoxedFuture<Result<SuccessResponse<Resp>, BoxError>>
        + Send
        + Sync,
>;

type OnSuccessFn<Resp> =
    Arc<dyn Fn(&RequestContext, &mut ResponseWriter, SuccessResponse<Resp>) + Send + Sync>;

type OnErrorFn = Arc<dyn Fn(&RequestContext, &mut ResponseWriter, &BoxError) + Send + Sync>;

type ObserveFn<Req> =
    Arc<dyn Fn(&RequestContext, &ParsedRequest<Req>, Option<&BoxError>) + Send + Sync>;

struct Stages<Req, Resp> {
    parse: Option<ParseFn<Req>>,
    authorize: Option<AuthorizeFn<Req>>,
    resolve: Option<ResolveFn<Req, Resp>>,
    on_success: Option<OnSuccessFn<Resp>>,
    on_error: Option<OnErrorFn>,
    monitor: Option<ObserveFn<Req>>,
    audit: Option<ObserveFn<Req>>,
}

impl<Req, Resp> Default for Stages<Req, Resp> {
    fn default() -> Self {
        Self {
            parse: None,
            authorize: None,
            resolve: None,
            on_success: None,
            on_error: None,
            monitor: None,
            audit: None,
        }
    }
}

impl<Req, Resp> Clone for Stages<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            parse: self.parse.clone(),
            authorize: self.authorize.clone(),
            resolve: self.resolve.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            monitor: self.monitor.clone(),
            audit: self.audit.clone(),
        }
    }
}

/// The content-producing stage that failed an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailedStage {
    Parse,
    Authorize,
    Resolve,
}

impl FailedStage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Authorize => "authorize",
            Self::Resolve => "resolve",
        }
    }
}

struct Failure {
    stage: FailedStage,
    error: BoxError,
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// A request handler assembled from optional, typed stages.
///
/// `Req` is the parsed request body type and `Resp` the success body type;
/// use [`EmptyRequest`](crate::EmptyRequest) / [`EmptyResponse`](crate::EmptyResponse)
/// when there is no payload in one direction.
///
/// Setters consume the chain and return the updated value. The stage table is
/// shared copy-on-write, so a chain that has been cloned into a router is never
/// mutated afterwards: configuring a clone produces an independent chain.
/// Unset stages are skipped (see each setter for the fallback).
pub struct Chain<Req, Resp> {
    stages: Arc<Stages<Req, Resp>>,
}

impl<Req, Resp> Clone for Chain<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            stages: Arc::clone(&self.stages),
        }
    }
}

impl<Req, Resp> Default for Chain<Req, Resp> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp> std::fmt::Debug for Chain<Req, Resp> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = &self.stages;
        f.debug_struct("Chain")
            .field("parse", &s.parse.is_some())
            .field("authorize", &s.authorize.is_some())
            .field("resolve", &s.resolve.is_some())
            .field("on_success", &s.on_success.is_some())
            .field("on_error", &s.on_error.is_some())
            .field("monitor", &s.monitor.is_some())
            .field("audit", &s.audit.is_some())
            .finish()
    }
}

impl<Req, Resp> Chain<Req, Resp> {
    /// A chain with no stages set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stages: Arc::new(Stages::default()),
        }
    }

    fn stages_mut(&mut self) -> &mut Stages<Req, Resp> {
        Arc::make_mut(&mut self.stages)
    }
}

impl<Req, Resp> Chain<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    /// Sets the parse stage.
    ///
    /// Without one, downstream stages get `ParsedRequest::default()` and the
    /// raw request is dropped unread.
    #[must_use]
    pub fn parse<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RequestContext, Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ParsedRequest<Req>, ParseFailure<Req>>> + Send + 'static,
    {
        self.stages_mut().parse = Some(Arc::new(
            move |ctx: RequestContext,
                  raw: Request<Body>|
                  -> BoxedFuture<Result<ParsedRequest<Req>, ParseFailure<Req>>> {
                Box::pin(f(ctx, raw))
            },
        ));
        self
    }

    /// Sets the authorize stage. Without one, every request is allowed.
    #[must_use]
    pub fn authorize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RequestContext, Arc<ParsedRequest<Req>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.stages_mut().authorize = Some(Arc::new(
            move |ctx: RequestContext,
                  req: Arc<ParsedRequest<Req>>|
                  -> BoxedFuture<Result<(), BoxError>> { Box::pin(f(ctx, req)) },
        ));
        self
    }

    /// Sets the resolve stage.
    ///
    /// Without one, on-success receives `SuccessResponse::default()`.
    /// Retries, if wanted, belong inside this stage.
    #[must_use]
    pub fn resolve<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RequestContext, Arc<ParsedRequest<Req>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SuccessResponse<Resp>, BoxError>> + Send + 'static,
    {
        self.stages_mut().resolve = Some(Arc::new(
            move |ctx: RequestContext,
                  req: Arc<ParsedRequest<Req>>|
                  -> BoxedFuture<Result<SuccessResponse<Resp>, BoxError>> {
                Box::pin(f(ctx, req))
            },
        ));
        self
    }

    /// Sets the stage that renders a successful response.
    ///
    /// Without one nothing is written on success. At least one of the stages
    /// must produce visible output or the endpoint answers an empty `200`.
    #[must_use]
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &mut ResponseWriter, SuccessResponse<Resp>) + Send + Sync + 'static,
    {
        self.stages_mut().on_success = Some(Arc::new(f));
        self
    }

    /// Sets the stage that renders a failure from parse, authorize or resolve.
    ///
    /// Without one, failures are swallowed: nothing is written and the caller
    /// sees an empty `200`. Only monitor and audit learn about the error.
    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &mut ResponseWriter, &BoxError) + Send + Sync + 'static,
    {
        self.stages_mut().on_error = Some(Arc::new(f));
        self
    }

    /// Sets the metrics stage, called once per invocation with the error
    /// (`None` on success).
    #[must_use]
    pub fn monitor<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &ParsedRequest<Req>, Option<&BoxError>) + Send + Sync + 'static,
    {
        self.stages_mut().monitor = Some(Arc::new(f));
        self
    }

    /// Sets the audit stage, called once per invocation after monitor.
    #[must_use]
    pub fn audit<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, &ParsedRequest<Req>, Option<&BoxError>) + Send + Sync + 'static,
    {
        self.stages_mut().audit = Some(Arc::new(f));
        self
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

impl<Req, Resp> Chain<Req, Resp>
where
    Req: Default + Send + Sync + 'static,
    Resp: Default + Send + 'static,
{
    /// Runs one invocation against `raw`, rendering into `writer`.
    ///
    /// Outcomes are only observable through `writer` and the monitor/audit
    /// stages. The context is handed unchanged to every stage.
    ///
    /// The invocation runs in its own `handle_chain` debug span, which records
    /// the outcome and the failing stage.
    ///
    /// Monitor and audit run once the returned future completes. Dropping it
    /// early (an outer timeout, a disconnect that aborts the task) skips them,
    /// so deadlines belong in `ctx` where stages can fail on them.
    pub async fn serve(&self, ctx: RequestContext, raw: Request<Body>, writer: &mut ResponseWriter) {
        let span = tracing::debug_span!(
            "handle_chain",
            method = %raw.method(),
            path = raw.uri().path(),
            outcome = tracing::field::Empty,
            failed_stage = tracing::field::Empty,
        );
        self.execute(ctx, raw, writer, &span)
            .instrument(span.clone())
            .await;
    }

    async fn execute(
        &self,
        ctx: RequestContext,
        raw: Request<Body>,
        writer: &mut ResponseWriter,
        span: &tracing::Span,
    ) {
        let stages = &self.stages;
        let (request, outcome) = self.produce(&ctx, raw).await;

        let error = match outcome {
            Ok(response) => {
                if let Some(on_success) = &stages.on_success {
                    on_success(&ctx, writer, response);
                }
                span.record("outcome", "success");
                None
            }
            Err(Failure { stage, error }) => {
                tracing::debug!(stage = stage.as_str(), error = %error, "stage failed");
                span.record("failed_stage", stage.as_str());
                span.record("outcome", "failure");
                if let Some(on_error) = &stages.on_error {
                    on_error(&ctx, writer, &error);
                }
                Some(error)
            }
        };

        if let Some(monitor) = &stages.monitor {
            monitor(&ctx, &request, error.as_ref());
        }
        if let Some(audit) = &stages.audit {
            audit(&ctx, &request, error.as_ref());
        }
    }

    /// Runs parse, authorize and resolve, stopping at the first failure.
    ///
    /// Returns the latest parsed request alongside the outcome so that
    /// observability sees how far the invocation got.
    async fn produce(
        &self,
        ctx: &RequestContext,
        raw: Request<Body>,
    ) -> (Arc<ParsedRequest<Req>>, Result<SuccessResponse<Resp>, Failure>) {
        let stages = &self.stages;

        let request = match &stages.parse {
            Some(parse) => match parse(ctx.clone(), raw).await {
                Ok(parsed) => Arc::new(parsed),
                Err(failure) => {
                    let (partial, error) = failure.into_parts();
                    return (
                        Arc::new(partial),
                        Err(Failure {
                            stage: FailedStage::Parse,
                            error,
                        }),
                    );
                }
            },
            None => Arc::new(ParsedRequest::default()),
        };

        if let Some(authorize) = &stages.authorize {
            if let Err(error) = authorize(ctx.clone(), Arc::clone(&request)).await {
                let failure = Failure {
                    stage: FailedStage::Authorize,
                    error,
                };
                return (request, Err(failure));
            }
        }

        let response = match &stages.resolve {
            Some(resolve) => match resolve(ctx.clone(), Arc::clone(&request)).await {
                Ok(response) => response,
                Err(error) => {
                    let failure = Failure {
                        stage: FailedStage::Resolve,
                        error,
                    };
                    return (request, Err(failure));
                }
            },
            None => SuccessResponse::default(),
        };

        (request, Ok(response))
    }
}

impl<Req, Resp> Service<Request<Body>> for Chain<Req, Resp>
where
    Req: Default + Send + Sync + 'static,
    Resp: Default + Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxedFuture<Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let chain = self.clone();
        Box::pin(async move {
            let ctx = req
                .extensions()
                .get::<RequestContext>()
                .cloned()
                .unwrap_or_default();
            let mut writer = ResponseWriter::new();
            chain.serve(ctx, req, &mut writer).await;
            Ok(writer.into_response())
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
