//! Encodes a [`ReceivedRequest`] into the request record layout described in
//! [`crate::protocol::record`].

use crate::protocol::record::*;
use crate::protocol::{ApiError, HeaderId, ReceivedRequest, RequestFlags, RequestHeaderId};
use bytes::{BufMut, BytesMut};
use std::net::SocketAddr;
use tokio_util::codec::Encoder;

/// One request record to encode.
///
/// A fixed-only record carries the scalar fields with every reference zeroed,
/// which is what a caller gets back when its buffer cannot hold the variable
/// area.
#[derive(Debug, Clone, Copy)]
pub struct RequestRecord<'a> {
    request: &'a ReceivedRequest,
    flags: RequestFlags,
    bytes_received: u64,
    layout: Layout<'a>,
}

#[derive(Debug, Clone, Copy)]
enum Layout<'a> {
    FixedOnly,
    Complete { entity: Option<&'a [u8]> },
}

impl<'a> RequestRecord<'a> {
    pub fn fixed_only(request: &'a ReceivedRequest, flags: RequestFlags, bytes_received: u64) -> Self {
        Self { request, flags, bytes_received, layout: Layout::FixedOnly }
    }

    /// A full record, with `entity` appended as a single entity chunk when present.
    pub fn complete(
        request: &'a ReceivedRequest,
        flags: RequestFlags,
        bytes_received: u64,
        entity: Option<&'a [u8]>,
    ) -> Self {
        Self { request, flags, bytes_received, layout: Layout::Complete { entity: entity.filter(|e| !e.is_empty()) } }
    }

    pub fn encoded_len(&self) -> usize {
        match self.layout {
            Layout::FixedOnly => REQUEST_FIXED_SIZE,
            Layout::Complete { entity: None } => record_size(self.request),
            Layout::Complete { entity: Some(entity) } => record_size(self.request) + ENTITY_CHUNK_DESC_SIZE + entity.len(),
        }
    }
}

/// Bytes needed for the fixed block plus the variable area, excluding any
/// entity body.
pub fn record_size(request: &ReceivedRequest) -> usize {
    let headers = &request.headers;
    let known: usize = headers.known().map(|(_, value)| value.len()).sum();
    let unknown: usize = headers
        .unknown()
        .iter()
        .map(|h| UNKNOWN_HEADER_DESC_SIZE + h.name.len() + h.value.len())
        .sum();

    REQUEST_FIXED_SIZE
        + request.unknown_verb.as_ref().map_or(0, |v| v.len())
        + request.raw_url.len()
        + request.cooked_url.full().len()
        + known
        + unknown
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordEncoder;

impl Encoder<RequestRecord<'_>> for RecordEncoder {
    type Error = ApiError;

    fn encode(&mut self, record: RequestRecord<'_>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let request = record.request;
        let total = record.encoded_len();
        if total > u32::MAX as usize {
            return Err(ApiError::invalid_argument("request record exceeds 4 GiB"));
        }

        let start = dst.len();
        dst.reserve(total);
        dst.put_bytes(0, REQUEST_FIXED_SIZE);

        let mut out = RecordWriter { dst, start };
        out.u32_at(FLAGS, record.flags.bits());
        out.u64_at(CONNECTION_ID, request.connection_id.0);
        out.u64_at(REQUEST_ID, request.request_id.0);
        out.u64_at(URL_CONTEXT, request.url_context);
        out.u16_at(VERSION_MAJOR, request.version.major);
        out.u16_at(VERSION_MINOR, request.version.minor);
        out.u32_at(VERB, request.verb.code());
        out.u64_at(BYTES_RECEIVED, record.bytes_received);
        out.addr_at(REMOTE_ADDR, request.remote_addr);
        out.addr_at(LOCAL_ADDR, request.local_addr);

        let Layout::Complete { entity } = record.layout else {
            return Ok(());
        };

        // descriptor tables first, strings after them
        let unknown = request.headers.unknown();
        let unknown_table = out.reserve(unknown.len() * UNKNOWN_HEADER_DESC_SIZE);
        out.u32_at(UNKNOWN_HEADERS, unknown.len() as u32);
        out.u32_at(UNKNOWN_HEADERS + 4, if unknown.is_empty() { 0 } else { unknown_table as u32 });

        let entity_table = entity.map(|_| out.reserve(ENTITY_CHUNK_DESC_SIZE));

        if let Some(verb) = &request.unknown_verb {
            out.append_ref(UNKNOWN_VERB, verb);
        }
        out.append_ref(RAW_URL, request.raw_url.as_bytes());

        let cooked = &request.cooked_url;
        let full = out.append_ref(FULL_URL, cooked.full().as_bytes());
        out.ref_at(HOST, full + cooked.host_range().start, cooked.host_range().len());
        out.ref_at(ABS_PATH, full + cooked.abs_path_range().start, cooked.abs_path_range().len());
        if let Some(query) = cooked.query_range() {
            out.ref_at(QUERY, full + query.start, query.len());
        }

        for (id, value) in request.headers.known() {
            out.append_ref(KNOWN_HEADERS + id.index() * REF_SIZE, value);
        }

        for (i, header) in unknown.iter().enumerate() {
            let desc = unknown_table + i * UNKNOWN_HEADER_DESC_SIZE;
            out.append_ref(desc, &header.name);
            out.append_ref(desc + REF_SIZE, &header.value);
        }

        if let (Some(entity), Some(table)) = (entity, entity_table) {
            out.u32_at(ENTITY_CHUNKS, 1);
            out.u32_at(ENTITY_CHUNKS + 4, table as u32);
            out.append_ref(table, entity);
        }

        debug_assert_eq!(out.dst.len() - start, total);
        Ok(())
    }
}

/// Writes little-endian fields at offsets relative to the record start.
struct RecordWriter<'a> {
    dst: &'a mut BytesMut,
    start: usize,
}

impl RecordWriter<'_> {
    fn u16_at(&mut self, at: usize, value: u16) {
        let at = self.start + at;
        self.dst[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn u32_at(&mut self, at: usize, value: u32) {
        let at = self.start + at;
        self.dst[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn u64_at(&mut self, at: usize, value: u64) {
        let at = self.start + at;
        self.dst[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn ref_at(&mut self, at: usize, offset: usize, len: usize) {
        self.u32_at(at, offset as u32);
        self.u32_at(at + 4, len as u32);
    }

    fn addr_at(&mut self, at: usize, addr: SocketAddr) {
        let (family, octets) = match addr {
            SocketAddr::V4(v4) => {
                let mut octets = [0u8; 16];
                octets[..4].copy_from_slice(&v4.ip().octets());
                (ADDR_FAMILY_V4, octets)
            }
            SocketAddr::V6(v6) => (ADDR_FAMILY_V6, v6.ip().octets()),
        };
        self.u16_at(at, family);
        self.u16_at(at + 2, addr.port());
        let at = self.start + at + 4;
        self.dst[at..at + 16].copy_from_slice(&octets);
    }

    /// Appends zeroed space, returning its offset.
    fn reserve(&mut self, len: usize) -> usize {
        let offset = self.dst.len() - self.start;
        self.dst.put_bytes(0, len);
        offset
    }

    /// Appends `bytes` to the variable area and points the reference at `at` to them.
    fn append_ref(&mut self, at: usize, bytes: &[u8]) -> usize {
        let offset = self.dst.len() - self.start;
        self.dst.put_slice(bytes);
        if !bytes.is_empty() {
            self.ref_at(at, offset, bytes.len());
        }
        offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        ConnectionId, CookedUrl, HttpVersion, PayloadSize, ReceivedRequest, RequestHead, RequestHeaders, RequestView,
        Verb,
    };
    use std::net::SocketAddr;

    fn request(method: &str, target: &str, extra: &[(&str, &str)]) -> ReceivedRequest {
        let local: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        let remote: SocketAddr = "[::1]:40000".parse().unwrap();
        let mut headers = RequestHeaders::new();
        headers.insert(b"Host", "localhost:50000");
        for (name, value) in extra {
            headers.insert(name.as_bytes(), value.to_string());
        }
        let head = RequestHead::new(method, target, HttpVersion::HTTP_11, headers, 100, PayloadSize::Empty);
        let cooked = CookedUrl::from_target(target, Some("localhost:50000"), local).unwrap();
        ReceivedRequest::new(head, cooked, ConnectionId::next(), 0xdeadbeef, remote, local)
    }

    fn encode(record: RequestRecord<'_>) -> BytesMut {
        let mut dst = BytesMut::new();
        RecordEncoder.encode(record, &mut dst).unwrap();
        dst
    }

    #[test]
    fn complete_record_round_trips_through_view() {
        let req = request("GET", "/foobar?a=b", &[("Qux", "foo baz"), ("User-Agent", "test")]);
        let record = RequestRecord::complete(&req, RequestFlags::NONE, 100, None);
        let buf = encode(record);

        assert_eq!(buf.len(), record_size(&req));
        assert_eq!(buf.len(), record.encoded_len());

        let view = RequestView::new(&buf).unwrap();
        assert_eq!(view.request_id(), req.request_id);
        assert_eq!(view.connection_id(), req.connection_id);
        assert_eq!(view.url_context(), 0xdeadbeef);
        assert_eq!(view.verb(), Some(Verb::Get));
        assert_eq!(view.version(), HttpVersion::HTTP_11);
        assert_eq!(view.bytes_received(), 100);
        assert_eq!(view.unknown_verb(), None);
        assert_eq!(view.raw_url(), Some("/foobar?a=b"));
        assert_eq!(view.full_url(), Some("http://localhost:50000/foobar?a=b"));

        let host = view.host().unwrap();
        assert_eq!(host, "localhost:50000");
        assert_eq!(view.offset_in_full_url(host), Some(7));
        let path = view.abs_path().unwrap();
        assert_eq!(path, "/foobar");
        assert_eq!(view.offset_in_full_url(path), Some(22));
        let query = view.query().unwrap();
        assert_eq!(query, "?a=b");
        assert_eq!(view.offset_in_full_url(query), Some(29));

        assert_eq!(view.known_header(RequestHeaderId::Host), Some(&b"localhost:50000"[..]));
        assert_eq!(view.known_header(RequestHeaderId::UserAgent), Some(&b"test"[..]));
        assert_eq!(view.known_header(RequestHeaderId::Accept), None);
        let unknown: Vec<_> = view.unknown_headers().collect();
        assert_eq!(unknown, vec![(&b"Qux"[..], &b"foo baz"[..])]);

        assert_eq!(view.local_addr(), Some(req.local_addr));
        assert_eq!(view.remote_addr(), Some(req.remote_addr));
        assert_eq!(view.entity_chunks().count(), 0);
        assert!(!view.more_entity_body());
    }

    #[test]
    fn unknown_verb_is_recorded() {
        let req = request("xyzzy", "/", &[]);
        let buf = encode(RequestRecord::complete(&req, RequestFlags::NONE, 0, None));
        let view = RequestView::new(&buf).unwrap();
        assert_eq!(view.verb(), Some(Verb::Unknown));
        assert_eq!(view.unknown_verb(), Some(&b"xyzzy"[..]));
    }

    #[test]
    fn fixed_only_record() {
        let req = request("GET", "/foobar", &[]);
        let buf = encode(RequestRecord::fixed_only(&req, RequestFlags::NONE, 42));

        assert_eq!(buf.len(), REQUEST_FIXED_SIZE);
        let view = RequestView::new(&buf).unwrap();
        assert_eq!(view.request_id(), req.request_id);
        assert_eq!(view.connection_id(), req.connection_id);
        assert_eq!(view.verb(), Some(Verb::Get));
        assert_eq!(view.bytes_received(), 42);
        assert_eq!(view.raw_url(), None);
        assert_eq!(view.known_header(RequestHeaderId::Host), None);
    }

    #[test]
    fn entity_chunk_is_appended() {
        let req = request("POST", "/", &[("Content-Length", "5")]);
        let body = b"ping\0";
        let record = RequestRecord::complete(&req, RequestFlags::NONE, 0, Some(&body[..]));
        let buf = encode(record);

        assert_eq!(buf.len(), record_size(&req) + ENTITY_CHUNK_DESC_SIZE + 5);
        let view = RequestView::new(&buf).unwrap();
        let chunks: Vec<_> = view.entity_chunks().collect();
        assert_eq!(chunks, vec![&body[..]]);
        assert_eq!(view.known_header(RequestHeaderId::ContentLength), Some(&b"5"[..]));
    }

    #[test]
    fn records_append_after_existing_bytes() {
        let req = request("GET", "/", &[]);
        let mut dst = BytesMut::from(&b"prefix"[..]);
        RecordEncoder.encode(RequestRecord::complete(&req, RequestFlags::MORE_ENTITY_BODY_EXISTS, 0, None), &mut dst).unwrap();

        let view = RequestView::new(&dst[6..]).unwrap();
        assert!(view.more_entity_body());
        assert_eq!(view.raw_url(), Some("/"));
    }
}
