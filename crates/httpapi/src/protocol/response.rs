//! Responses submitted by consumers for a previously received request.

use crate::protocol::{HttpVersion, ResponseHeaderId, ResponseHeaders};
use bytes::Bytes;
use http::StatusCode;
use std::fmt;
use tokio::io::AsyncRead;

/// One piece of a response body.
pub enum DataChunk {
    FromMemory(Bytes),
    /// Read to its end and copied onto the connection as it is written.
    FromStream(Box<dyn AsyncRead + Send + Unpin>),
}

impl fmt::Debug for DataChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataChunk::FromMemory(bytes) => f.debug_tuple("FromMemory").field(&bytes.len()).finish(),
            DataChunk::FromStream(_) => f.write_str("FromStream"),
        }
    }
}

/// Status line, headers and ordered body chunks of a response.
///
/// Nothing is derived from the body: `Content-Length` is written only when
/// the caller sets it, and only `Date` is added when missing.
#[derive(Debug)]
pub struct HttpResponse {
    status: u16,
    reason: Option<String>,
    version: HttpVersion,
    headers: ResponseHeaders,
    chunks: Vec<DataChunk>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self { status, reason: None, version: HttpVersion::HTTP_11, headers: ResponseHeaders::new(), chunks: Vec::new() }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_header(mut self, id: ResponseHeaderId, value: impl Into<Bytes>) -> Self {
        self.headers.set(id, value);
        self
    }

    pub fn with_unknown_header(mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.headers.push_unknown(name, value);
        self
    }

    pub fn with_chunk(mut self, bytes: impl Into<Bytes>) -> Self {
        self.chunks.push(DataChunk::FromMemory(bytes.into()));
        self
    }

    pub fn with_stream(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.chunks.push(DataChunk::FromStream(Box::new(reader)));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// The caller's reason phrase, or the canonical one for the status code.
    pub fn reason(&self) -> &str {
        match &self.reason {
            Some(reason) => reason,
            None => StatusCode::from_u16(self.status).ok().and_then(|s| s.canonical_reason()).unwrap_or(""),
        }
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut ResponseHeaders {
        &mut self.headers
    }

    pub(crate) fn into_chunks(self) -> Vec<DataChunk> {
        self.chunks
    }

    /// `Connection: close` on the response ends the connection after the write.
    pub fn closes_connection(&self) -> bool {
        self.headers.has_token(ResponseHeaderId::Connection, "close")
    }

    pub(crate) fn bad_request() -> Self {
        Self::new(400).with_header(ResponseHeaderId::Connection, "close").with_header(ResponseHeaderId::ContentLength, "0")
    }

    pub(crate) fn not_found() -> Self {
        Self::new(404).with_header(ResponseHeaderId::Connection, "close").with_header(ResponseHeaderId::ContentLength, "0")
    }

    pub(crate) fn service_unavailable() -> Self {
        Self::new(503).with_header(ResponseHeaderId::Connection, "close").with_header(ResponseHeaderId::ContentLength, "0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_reason_when_missing() {
        assert_eq!(HttpResponse::new(404).reason(), "Not Found");
        assert_eq!(HttpResponse::new(418).with_reason("I'm a teapot").reason(), "I'm a teapot");
        assert_eq!(HttpResponse::new(599).reason(), "");
    }

    #[test]
    fn connection_close_detection() {
        assert!(HttpResponse::bad_request().closes_connection());
        assert!(!HttpResponse::new(200).closes_connection());
    }
}
