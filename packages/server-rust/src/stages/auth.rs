//! Bearer-token authorize stage.

use std::future::{ready, Ready};
use std::sync::Arc;

use handle_chain::{BoxError, ParsedRequest, RequestContext};
use http::header::AUTHORIZATION;
use http::HeaderMap;
use subtle::{Choice, ConstantTimeEq};

use super::error::ApiError;

/// Accepts requests carrying `Authorization: Bearer <token>` for one of the
/// configured tokens. With no tokens configured every request is forbidden.
#[derive(Clone)]
pub struct BearerAuth {
    tokens: Arc<[String]>,
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl BearerAuth {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    /// # Errors
    ///
    /// `Unauthorized` when the header is missing or malformed, `Forbidden`
    /// when the token is not recognised.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let presented = extract_bearer(headers)?;

        // Compare against every token so timing does not reveal which matched.
        let matched = self
            .tokens
            .iter()
            .fold(Choice::from(0), |acc, token| {
                acc | token.as_bytes().ct_eq(presented.as_bytes())
            });

        if bool::from(matched) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// The authorize stage for a chain of any request type.
    pub fn stage<Req>(
        &self,
    ) -> impl Fn(RequestContext, Arc<ParsedRequest<Req>>) -> Ready<Result<(), BoxError>>
           + Send
           + Sync
           + 'static
    where
        Req: Send + Sync + 'static,
    {
        let auth = self.clone();
        move |_ctx: RequestContext, req: Arc<ParsedRequest<Req>>| {
            ready(auth.check(&req.headers).map_err(BoxError::from))
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(ApiError::Unauthorized)?
        .to_str()
        .map_err(|_| ApiError::Unauthorized)?;

    // Auth schemes are case-insensitive (RFC 7235).
    let (scheme, token) = value.split_once(' ').ok_or(ApiError::Unauthorized)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(ApiError::Unauthorized);
    }
    Ok(token)
}
