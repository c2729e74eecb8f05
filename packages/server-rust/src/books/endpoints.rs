//! Chains for the `/books` routes.

use std::sync::Arc;

use handle_chain::{
    BoxError, Chain, EmptyRequest, EmptyResponse, ParsedRequest, RequestContext, SuccessResponse,
};
use http::header::LOCATION;
use http::{HeaderValue, StatusCode};

use super::store::BookStore;
use super::Book;
use crate::app::AppState;
use crate::stages::{
    audit_log, ensure_live, parse_empty, parse_validated_json, record_metrics, render_empty,
    render_error, render_json, ApiError,
};

/// `POST /books`: stores a book, answers `201` with its `Location`.
#[must_use]
pub fn create_book(state: &AppState) -> Chain<Book, EmptyResponse> {
    let store = Arc::clone(&state.store);
    Chain::new()
        .parse(parse_validated_json::<Book>)
        .authorize(state.auth.stage())
        .resolve(move |ctx, req| {
            let store = Arc::clone(&store);
            async move { insert_book(&ctx, &store, &req).map_err(BoxError::from) }
        })
        .on_success(render_empty)
        .on_error(render_error)
        .monitor(record_metrics("create_book"))
        .audit(audit_log("create_book"))
}

/// `GET /books?author=..&limit=..`
#[must_use]
pub fn list_books(state: &AppState) -> Chain<EmptyRequest, Vec<Book>> {
    let store = Arc::clone(&state.store);
    Chain::new()
        .parse(parse_empty)
        .resolve(move |ctx, req| {
            let store = Arc::clone(&store);
            async move { find_books(&ctx, &store, &req).map_err(BoxError::from) }
        })
        .on_success(render_json::<Vec<Book>>)
        .on_error(render_error)
        .monitor(record_metrics("list_books"))
}

/// `GET /books/{id}`
#[must_use]
pub fn get_book(state: &AppState) -> Chain<EmptyRequest, Book> {
    let store = Arc::clone(&state.store);
    Chain::new()
        .parse(parse_empty)
        .resolve(move |ctx, req| {
            let store = Arc::clone(&store);
            async move { fetch_book(&ctx, &store, &req).map_err(BoxError::from) }
        })
        .on_success(render_json::<Book>)
        .on_error(render_error)
        .monitor(record_metrics("get_book"))
}

/// `DELETE /books/{id}`: answers `204`.
#[must_use]
pub fn delete_book(state: &AppState) -> Chain<EmptyRequest, EmptyResponse> {
    let store = Arc::clone(&state.store);
    Chain::new()
        .parse(parse_empty)
        .authorize(state.auth.stage())
        .resolve(move |ctx, req| {
            let store = Arc::clone(&store);
            async move { remove_book(&ctx, &store, &req).map_err(BoxError::from) }
        })
        .on_success(render_empty)
        .on_error(render_error)
        .monitor(record_metrics("delete_book"))
        .audit(audit_log("delete_book"))
}

// ---------------------------------------------------------------------------
// Resolvers
// ---------------------------------------------------------------------------

fn insert_book(
    ctx: &RequestContext,
    store: &BookStore,
    req: &ParsedRequest<Book>,
) -> Result<SuccessResponse<EmptyResponse>, ApiError> {
    ensure_live(ctx)?;

    let mut book = req.body.clone();
    if book.id.is_empty() {
        book.id = uuid::Uuid::new_v4().to_string();
    }
    let location = HeaderValue::try_from(format!("/books/{}", book.id))
        .map_err(|e| ApiError::Internal(e.into()))?;

    store.insert(book)?;

    let mut response = SuccessResponse::new(StatusCode::CREATED, EmptyResponse);
    response.headers.insert(LOCATION, location);
    Ok(response)
}

fn find_books(
    ctx: &RequestContext,
    store: &BookStore,
    req: &ParsedRequest<EmptyRequest>,
) -> Result<SuccessResponse<Vec<Book>>, ApiError> {
    ensure_live(ctx)?;

    let limit = req
        .query_param("limit")
        .map(str::parse::<usize>)
        .transpose()
        .map_err(|_| ApiError::BadRequest("limit must be a non-negative integer".into()))?;

    Ok(SuccessResponse::ok(store.list(req.query_param("author"), limit)))
}

fn book_id(req: &ParsedRequest<EmptyRequest>) -> Result<&str, ApiError> {
    req.path_param("id")
        .ok_or_else(|| ApiError::BadRequest("missing book id".into()))
}

fn fetch_book(
    ctx: &RequestContext,
    store: &BookStore,
    req: &ParsedRequest<EmptyRequest>,
) -> Result<SuccessResponse<Book>, ApiError> {
    ensure_live(ctx)?;
    let id = book_id(req)?;
    store
        .get(id)
        .map(SuccessResponse::ok)
        .ok_or_else(|| ApiError::NotFound(format!("book {id}")))
}

fn remove_book(
    ctx: &RequestContext,
    store: &BookStore,
    req: &ParsedRequest<EmptyRequest>,
) -> Result<SuccessResponse<EmptyResponse>, ApiError> {
    ensure_live(ctx)?;
    let id = book_id(req)?;
    store
        .remove(id)
        .map(|_| SuccessResponse::new(StatusCode::NO_CONTENT, EmptyResponse))
        .ok_or_else(|| ApiError::NotFound(format!("book {id}")))
}
