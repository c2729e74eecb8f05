//! Parse stages: turn an axum request into a `ParsedRequest`.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::rejection::RawPathParamsRejection;
use axum::extract::{FromRequestParts, Query, RawPathParams};
use handle_chain::{EmptyRequest, ParseFailure, ParsedRequest, RequestContext};
use http::request::Parts;
use http::Request;
use serde::de::DeserializeOwned;

use super::error::{run_bounded, ApiError};
use crate::network::BodyLimit;

/// Body limit applied when the context carries no [`BodyLimit`].
pub const DEFAULT_BODY_LIMIT: usize = 1_048_576;

/// Request bodies that can check their own invariants after decoding.
pub trait Validate {
    /// # Errors
    ///
    /// Returns `ApiError::BadRequest` describing the first violated invariant.
    fn validate(&self) -> Result<(), ApiError>;
}

/// Parse stage for endpoints without a body: headers and parameters only.
///
/// # Errors
///
/// Fails on path parameters that are not valid UTF-8 or a malformed query.
pub async fn parse_empty(
    _ctx: RequestContext,
    raw: Request<Body>,
) -> Result<ParsedRequest<EmptyRequest>, ParseFailure<EmptyRequest>> {
    let (mut parts, _body) = raw.into_parts();
    envelope(&mut parts).await
}

/// Parse stage decoding a JSON body into `T`.
///
/// When the body fails to read or decode, the failure still carries the
/// headers and parameters that were parsed.
///
/// # Errors
///
/// `ApiError::BadRequest` for oversized or malformed bodies.
pub async fn parse_json<T>(
    ctx: RequestContext,
    raw: Request<Body>,
) -> Result<ParsedRequest<T>, ParseFailure<T>>
where
    T: DeserializeOwned + Default,
{
    let (mut parts, body) = raw.into_parts();
    let envelope = envelope::<T>(&mut parts).await?;

    let limit = ctx
        .value::<BodyLimit>()
        .map_or(DEFAULT_BODY_LIMIT, |limit| limit.0);

    // A slow client must not hold the invocation past its deadline.
    let read = async {
        axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| ApiError::BadRequest(format!("unreadable body: {e}")))
    };
    let bytes = match run_bounded(&ctx, read).await {
        Ok(bytes) => bytes,
        Err(err) => return Err(ParseFailure::with_partial(envelope, err)),
    };

    match serde_json::from_slice::<T>(&bytes) {
        Ok(body) => Ok(ParsedRequest { body, ..envelope }),
        Err(e) => {
            let err = ApiError::BadRequest(format!("invalid JSON: {e}"));
            Err(ParseFailure::with_partial(envelope, err))
        }
    }
}

/// [`parse_json`] followed by [`Validate::validate`]. A body that decodes but
/// fails validation is kept in the partial request.
///
/// # Errors
///
/// Everything [`parse_json`] returns, plus validation failures.
pub async fn parse_validated_json<T>(
    ctx: RequestContext,
    raw: Request<Body>,
) -> Result<ParsedRequest<T>, ParseFailure<T>>
where
    T: DeserializeOwned + Default + Validate,
{
    let parsed = parse_json::<T>(ctx, raw).await?;
    match parsed.body.validate() {
        Ok(()) => Ok(parsed),
        Err(err) => Err(ParseFailure::with_partial(parsed, err)),
    }
}

/// Headers, path and query parameters with a zero-valued body.
async fn envelope<T: Default>(parts: &mut Parts) -> Result<ParsedRequest<T>, ParseFailure<T>> {
    let mut parsed = ParsedRequest {
        headers: parts.headers.clone(),
        ..ParsedRequest::default()
    };

    parsed.path_params = match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        // Invoked outside a router, or on a route without parameters.
        Err(RawPathParamsRejection::MissingPathParams(_)) => HashMap::new(),
        Err(e) => {
            let err = ApiError::BadRequest(format!("invalid path: {e}"));
            return Err(ParseFailure::with_partial(parsed, err));
        }
    };

    parsed.query_params = match Query::<HashMap<String, String>>::try_from_uri(&parts.uri) {
        Ok(Query(query)) => query,
        Err(e) => {
            let err = ApiError::BadRequest(format!("invalid query: {e}"));
            return Err(ParseFailure::with_partial(parsed, err));
        }
    };

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Note {
        text: String,
    }

    impl Validate for Note {
        fn validate(&self) -> Result<(), ApiError> {
            if self.text.is_empty() {
                return Err(ApiError::BadRequest("text must not be empty".into()));
            }
            Ok(())
        }
    }

    fn post(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    fn api_error<T>(failure: &ParseFailure<T>) -> &ApiError {
        failure.error.downcast_ref::<ApiError>().expect("ApiError")
    }

    #[tokio::test]
    async fn parse_empty_reads_query_and_headers() {
        let raw = Request::builder()
            .uri("/books?author=Le%20Guin&limit=2")
            .header("x-trace", "t-1")
            .body(Body::empty())
            .unwrap();

        let parsed = parse_empty(RequestContext::background(), raw).await.unwrap();

        assert_eq!(parsed.query_param("author"), Some("Le Guin"));
        assert_eq!(parsed.query_param("limit"), Some("2"));
        assert_eq!(parsed.headers["x-trace"], "t-1");
        assert!(parsed.path_params.is_empty());
    }

    #[tokio::test]
    async fn parse_json_decodes_body() {
        let parsed = parse_json::<Note>(RequestContext::background(), post("/notes", r#"{"text":"hi"}"#))
            .await
            .unwrap();
        assert_eq!(parsed.body, Note { text: "hi".into() });
        assert_eq!(parsed.headers["content-type"], "application/json");
    }

    #[tokio::test]
    async fn malformed_json_keeps_headers_in_partial() {
        let failure = parse_json::<Note>(RequestContext::background(), post("/notes?x=1", "{not json"))
            .await
            .unwrap_err();

        assert!(matches!(api_error(&failure), ApiError::BadRequest(_)));
        assert_eq!(failure.partial.headers["content-type"], "application/json");
        assert_eq!(failure.partial.query_param("x"), Some("1"));
        assert_eq!(failure.partial.body, Note::default());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let ctx = RequestContext::background().with_value(BodyLimit(4));
        let failure = parse_json::<Note>(ctx, post("/notes", r#"{"text":"too long"}"#))
            .await
            .unwrap_err();
        assert!(matches!(api_error(&failure), ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn body_read_stops_at_context_deadline() {
        let ctx = RequestContext::background().with_timeout(std::time::Duration::ZERO);
        let failure = parse_json::<Note>(ctx, post("/notes?x=1", r#"{"text":"hi"}"#))
            .await
            .unwrap_err();
        assert!(matches!(api_error(&failure), ApiError::Unavailable));
        assert_eq!(failure.partial.query_param("x"), Some("1"));
    }

    #[tokio::test]
    async fn validation_failure_keeps_decoded_body() {
        let failure =
            parse_validated_json::<Note>(RequestContext::background(), post("/notes", r#"{"text":""}"#))
                .await
                .unwrap_err();
        assert!(matches!(api_error(&failure), ApiError::BadRequest(_)));
        assert_eq!(failure.partial.body, Note { text: String::new() });
    }
}
