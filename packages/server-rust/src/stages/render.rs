//! On-success and on-error stages writing JSON.

use handle_chain::{BoxError, EmptyResponse, RequestContext, ResponseWriter, SuccessResponse};
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::json;

use super::error::ApiError;
use crate::network::RequestId;

fn application_json() -> HeaderValue {
    HeaderValue::from_static("application/json")
}

/// Writes status, headers and the body serialized as JSON.
pub fn render_json<T: Serialize>(
    _ctx: &RequestContext,
    writer: &mut ResponseWriter,
    response: SuccessResponse<T>,
) {
    let body = match serde_json::to_vec(&response.body) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response body");
            write_error_body(writer, StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None);
            return;
        }
    };

    writer.set_status(response.status);
    writer.headers_mut().extend(response.headers);
    writer.headers_mut().insert(CONTENT_TYPE, application_json());
    writer.write(body);
}

/// Writes status and headers only.
pub fn render_empty(
    _ctx: &RequestContext,
    writer: &mut ResponseWriter,
    response: SuccessResponse<EmptyResponse>,
) {
    writer.set_status(response.status);
    writer.headers_mut().extend(response.headers);
}

/// Renders `{"error": code, "message": msg, "request_id": id}`.
///
/// `ApiError`s keep their status and message. Other errors become a 500 whose
/// message is not exposed to the client.
pub fn render_error(ctx: &RequestContext, writer: &mut ResponseWriter, err: &BoxError) {
    let (status, code) = ApiError::classify(err);
    let message = match err.downcast_ref::<ApiError>() {
        Some(ApiError::Internal(_)) | None => {
            tracing::error!(error = %err, "request failed");
            "internal server error".to_string()
        }
        Some(api) => api.to_string(),
    };
    let request_id = ctx.value::<RequestId>().map(|id| id.0.as_str());
    write_error_body(writer, status, code, Some((message.as_str(), request_id)));
}

fn write_error_body(
    writer: &mut ResponseWriter,
    status: StatusCode,
    code: &str,
    detail: Option<(&str, Option<&str>)>,
) {
    let (message, request_id) = detail.unwrap_or(("internal server error", None));
    let body = json!({
        "error": code,
        "message": message,
        "request_id": request_id,
    });
    writer.set_status(status);
    writer.headers_mut().insert(CONTENT_TYPE, application_json());
    writer.write(body.to_string());
}

#[cfg(test)]
mod tests {
    use http::header::LOCATION;

    use super::*;

    fn body_json(writer: &ResponseWriter) -> serde_json::Value {
        serde_json::from_slice(writer.body()).unwrap()
    }

    #[test]
    fn render_json_writes_status_headers_and_body() {
        let mut response = SuccessResponse::new(StatusCode::CREATED, vec!["a", "b"]);
        response
            .headers
            .insert(LOCATION, HeaderValue::from_static("/things/1"));

        let mut writer = ResponseWriter::new();
        render_json(&RequestContext::background(), &mut writer, response);

        assert_eq!(writer.status(), Some(StatusCode::CREATED));
        assert_eq!(writer.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(writer.headers()[LOCATION], "/things/1");
        assert_eq!(body_json(&writer), json!(["a", "b"]));
    }

    #[test]
    fn render_empty_writes_no_body() {
        let mut writer = ResponseWriter::new();
        render_empty(
            &RequestContext::background(),
            &mut writer,
            SuccessResponse::new(StatusCode::NO_CONTENT, EmptyResponse),
        );
        assert_eq!(writer.status(), Some(StatusCode::NO_CONTENT));
        assert!(writer.body().is_empty());
    }

    #[test]
    fn render_error_maps_api_errors() {
        let ctx = RequestContext::background().with_value(RequestId("r-1".into()));
        let err: BoxError = Box::new(ApiError::NotFound("book b-1".into()));

        let mut writer = ResponseWriter::new();
        render_error(&ctx, &mut writer, &err);

        assert_eq!(writer.status(), Some(StatusCode::NOT_FOUND));
        let body = body_json(&writer);
        assert_eq!(body["error"], "not_found");
        assert_eq!(body["message"], "not found: book b-1");
        assert_eq!(body["request_id"], "r-1");
    }

    #[test]
    fn render_error_hides_foreign_errors() {
        let err: BoxError = "connection string leaked here".into();

        let mut writer = ResponseWriter::new();
        render_error(&RequestContext::background(), &mut writer, &err);

        assert_eq!(writer.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let body = body_json(&writer);
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "internal server error");
        assert!(body["request_id"].is_null());
    }
}
