//! Request head decoder built on `httparse`.
//!
//! Parses the request line and header block into a [`RequestHead`]. Known
//! headers go to their fixed slot (the last occurrence wins), everything else
//! to the unknown list in arrival order, and every value is trimmed with inner
//! whitespace runs collapsed. The entity body framing is derived from
//! `Content-Length` or `Transfer-Encoding: chunked` regardless of the verb.

use std::mem::MaybeUninit;

use bytes::BytesMut;
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::header::normalize_value;
use crate::protocol::{HttpVersion, ParseError, PayloadSize, RequestHead, RequestHeaderId, RequestHeaders};

/// Default maximum number of headers in a request.
pub const DEFAULT_MAX_HEADERS: usize = 64;

/// Default maximum size of the request line plus header block.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct HeaderDecoder {
    max_headers: usize,
    max_header_bytes: usize,
}

impl HeaderDecoder {
    pub fn new(max_headers: usize, max_header_bytes: usize) -> Self {
        Self { max_headers, max_header_bytes }
    }
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEADERS, DEFAULT_MAX_HEADER_BYTES)
    }
}

impl Decoder for HeaderDecoder {
    type Item = RequestHead;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut req = httparse::Request::new(&mut []);
        let mut headers: Vec<MaybeUninit<httparse::Header<'_>>> = Vec::with_capacity(self.max_headers);
        headers.resize_with(self.max_headers, MaybeUninit::uninit);

        let parsed = req.parse_with_uninit_headers(src, &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(self.max_headers),
            Error::Version => ParseError::InvalidVersion(None),
            e => ParseError::invalid_header(e.to_string()),
        })?;

        let head_len = match parsed {
            Status::Complete(head_len) => head_len,
            Status::Partial => {
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                return Ok(None);
            }
        };

        trace!(head_len, header_count = req.headers.len(), "parsed request head");
        ensure!(head_len <= self.max_header_bytes, ParseError::too_large_header(head_len, self.max_header_bytes));

        let method = req.method.ok_or(ParseError::InvalidMethod)?;
        let path = req.path.ok_or(ParseError::InvalidUri)?;
        let version = HttpVersion::from_httparse(req.version)?;

        let mut table = RequestHeaders::new();
        for header in req.headers.iter() {
            table.insert(header.name.as_bytes(), normalize_value(header.value));
        }

        let payload_size = parse_payload(&table)?;
        let head = RequestHead::new(method, path, version, table, head_len, payload_size);

        // the head is owned by `RequestHead` now
        drop(headers);
        let _ = src.split_to(head_len);
        Ok(Some(head))
    }
}

/// Body framing per RFC 9112 section 6: chunked wins over a length, and a
/// request carrying both is rejected.
fn parse_payload(headers: &RequestHeaders) -> Result<PayloadSize, ParseError> {
    let te = headers.get(RequestHeaderId::TransferEncoding);
    let cl = headers.get(RequestHeaderId::ContentLength);

    match (te, cl) {
        (None, None) => Ok(PayloadSize::Empty),

        (Some(te), None) => {
            if is_chunked(te) {
                Ok(PayloadSize::Chunked)
            } else {
                Err(ParseError::invalid_body(format!("unsupported transfer-encoding {}", String::from_utf8_lossy(te))))
            }
        }

        (None, Some(cl)) => {
            let cl_str = std::str::from_utf8(cl).map_err(|_| ParseError::invalid_content_length("value is not utf-8"))?;
            let length = cl_str.parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;
            Ok(PayloadSize::Length(length))
        }

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer-encoding and content-length both present")),
    }
}

/// Chunked must be the final transfer coding.
fn is_chunked(value: &[u8]) -> bool {
    value.rsplit(|b| *b == b',').next().is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(b"chunked"))
}
