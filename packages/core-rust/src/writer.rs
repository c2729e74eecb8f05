//! Response sink handed to the rendering stages.

use std::io;

use axum::body::Body;
use axum::response::Response;
use bytes::{BufMut, BytesMut};
use http::{HeaderMap, StatusCode};

/// Write-only response sink for the on-success and on-error stages.
///
/// The chain never writes to it. After the invocation the transport turns it
/// into an `http::Response` with [`ResponseWriter::into_response`]. A writer
/// nobody touched becomes `200 OK` with an empty body.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status code. Only the first call takes effect.
    pub fn set_status(&mut self, status: StatusCode) {
        match self.status {
            None => self.status = Some(status),
            Some(existing) => {
                tracing::warn!(
                    existing = existing.as_u16(),
                    ignored = status.as_u16(),
                    "response status already set"
                );
            }
        }
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Appends to the body. Implies `200 OK` if no status was set yet.
    pub fn write(&mut self, data: impl AsRef<[u8]>) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.put_slice(data.as_ref());
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// True once a status, a header or any body bytes were written.
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.status.is_some() || !self.headers.is_empty() || !self.body.is_empty()
    }

    #[must_use]
    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body.freeze()));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl io::Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseWriter::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
