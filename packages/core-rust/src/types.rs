//! Data carried between stages.

use std::collections::HashMap;
use std::fmt;

use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};

/// Opaque error returned by any stage. The chain routes it, never inspects it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Payload type for endpoints that expect no request body (e.g. `GET`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyRequest;

/// Payload type for endpoints that send no response body (e.g. `204`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResponse;

/// The request as produced by the parse stage.
///
/// `Default` is the zero value handed downstream when no parse stage is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRequest<Req> {
    pub body: Req,
    pub headers: HeaderMap,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
}

impl<Req> ParsedRequest<Req> {
    /// A request with the given body and no headers or parameters.
    pub fn new(body: Req) -> Self {
        Self {
            body,
            headers: HeaderMap::new(),
            path_params: HashMap::new(),
            query_params: HashMap::new(),
        }
    }

    /// Looks up a path parameter.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    /// Looks up a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(String::as_str)
    }
}

/// The result of a successful resolve stage, rendered by the on-success stage.
///
/// The zero value is `200 OK` with a default body and no headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessResponse<Resp> {
    pub status: StatusCode,
    pub body: Resp,
    pub headers: HeaderMap,
}

impl<Resp> SuccessResponse<Resp> {
    pub fn new(status: StatusCode, body: Resp) -> Self {
        Self {
            status,
            body,
            headers: HeaderMap::new(),
        }
    }

    /// `200 OK` with the given body.
    pub fn ok(body: Resp) -> Self {
        Self::new(StatusCode::OK, body)
    }
}

/// Error returned by a parse stage.
///
/// Carries the part of the request that was parsed before the failure so the
/// error and observability stages can see it.
pub struct ParseFailure<Req> {
    pub partial: ParsedRequest<Req>,
    pub error: BoxError,
}

impl<Req: Default> ParseFailure<Req> {
    /// A failure with nothing parsed.
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self {
            partial: ParsedRequest::default(),
            error: error.into(),
        }
    }
}

impl<Req> ParseFailure<Req> {
    /// A failure that keeps what was parsed so far.
    pub fn with_partial(partial: ParsedRequest<Req>, error: impl Into<BoxError>) -> Self {
        Self {
            partial,
            error: error.into(),
        }
    }

    pub fn into_parts(self) -> (ParsedRequest<Req>, BoxError) {
        (self.partial, self.error)
    }
}

impl<Req: fmt::Debug> fmt::Debug for ParseFailure<Req> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseFailure")
            .field("partial", &self.partial)
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values() {
        let req = ParsedRequest::<EmptyRequest>::default();
        assert!(req.headers.is_empty());
        assert!(req.path_params.is_empty());
        assert!(req.query_params.is_empty());

        let resp = SuccessResponse::<EmptyResponse>::default();
        assert_eq!(resp.status, StatusCode::OK);
        assert!(resp.headers.is_empty());
    }

    #[test]
    fn parse_failure_keeps_partial_request() {
        let mut partial = ParsedRequest::new(7_u32);
        partial.path_params.insert("id".into(), "b-1".into());

        let (req, err) = ParseFailure::with_partial(partial, "bad json").into_parts();
        assert_eq!(req.body, 7);
        assert_eq!(req.path_param("id"), Some("b-1"));
        assert_eq!(err.to_string(), "bad json");
    }

    #[test]
    fn parse_failure_new_is_zero_valued() {
        let failure = ParseFailure::<u32>::new("unreadable");
        assert_eq!(failure.partial, ParsedRequest::default());
    }
}
