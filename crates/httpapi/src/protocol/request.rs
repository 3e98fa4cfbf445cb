//! Parsed request heads and the immutable request snapshot handed to consumers.
//!
//! The decoder produces a [`RequestHead`] straight from the wire. Once the
//! connection knows where the request is routed it becomes a
//! [`ReceivedRequest`], which is what queues park and what receive calls copy
//! into caller memory.

use crate::protocol::{
    ConnectionId, CookedUrl, HttpVersion, ParseError, PayloadSize, RequestHeaderId, RequestHeaders, RequestId,
    UrlContext, Verb,
};
use bytes::Bytes;
use std::net::SocketAddr;

/// Request line and headers of one request, as decoded off the wire.
#[derive(Debug, Clone)]
pub struct RequestHead {
    verb: Verb,
    unknown_verb: Option<Bytes>,
    raw_url: String,
    version: HttpVersion,
    headers: RequestHeaders,
    head_len: usize,
    payload_size: PayloadSize,
}

impl RequestHead {
    pub(crate) fn new(
        method: &str,
        raw_url: &str,
        version: HttpVersion,
        headers: RequestHeaders,
        head_len: usize,
        payload_size: PayloadSize,
    ) -> Self {
        let verb = Verb::from_token(method.as_bytes());
        let unknown_verb = (verb == Verb::Unknown).then(|| Bytes::copy_from_slice(method.as_bytes()));
        Self { verb, unknown_verb, raw_url: raw_url.to_string(), version, headers, head_len, payload_size }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn unknown_verb(&self) -> Option<&Bytes> {
        self.unknown_verb.as_ref()
    }

    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &RequestHeaders {
        &self.headers
    }

    /// Bytes of the request line and header block including the blank line.
    pub fn head_len(&self) -> usize {
        self.head_len
    }

    pub fn payload_size(&self) -> PayloadSize {
        self.payload_size
    }

    /// Whether the connection stays open after this request's response.
    pub fn keep_alive(&self) -> bool {
        if self.headers.has_token(RequestHeaderId::Connection, "close") {
            false
        } else if self.headers.has_token(RequestHeaderId::Connection, "keep-alive") {
            true
        } else {
            self.version.keep_alive_by_default()
        }
    }

    /// Builds the cooked URL from the target and the `Host` header.
    pub fn cooked_url(&self, local_addr: SocketAddr) -> Result<CookedUrl, ParseError> {
        let host = self.headers.get(RequestHeaderId::Host).and_then(|h| std::str::from_utf8(h).ok());
        CookedUrl::from_target(&self.raw_url, host, local_addr)
    }
}

/// Everything known about a request at the moment it is queued.
///
/// The snapshot never changes after parsing. Progress of the entity body and
/// the bytes received so far live on the connection.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub connection_id: ConnectionId,
    pub request_id: RequestId,
    pub url_context: UrlContext,
    pub version: HttpVersion,
    pub verb: Verb,
    pub unknown_verb: Option<Bytes>,
    pub raw_url: String,
    pub cooked_url: CookedUrl,
    pub headers: RequestHeaders,
    pub remote_addr: SocketAddr,
    pub local_addr: SocketAddr,
    pub head_len: usize,
    pub payload_size: PayloadSize,
}

impl ReceivedRequest {
    pub(crate) fn new(
        head: RequestHead,
        cooked_url: CookedUrl,
        connection_id: ConnectionId,
        url_context: UrlContext,
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
    ) -> Self {
        Self {
            connection_id,
            request_id: RequestId::next(),
            url_context,
            version: head.version,
            verb: head.verb,
            unknown_verb: head.unknown_verb,
            raw_url: head.raw_url,
            cooked_url,
            headers: head.headers,
            remote_addr,
            local_addr,
            head_len: head.head_len,
            payload_size: head.payload_size,
        }
    }

    pub fn has_body(&self) -> bool {
        !self.payload_size.is_empty()
    }
}
