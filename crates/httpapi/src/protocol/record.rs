//! Binary layout of a request as it is copied into a caller's receive buffer.
//!
//! The record starts with a fixed-size block of little-endian scalars and
//! `(offset, length)` references, followed by a variable area holding strings,
//! header values and entity chunks. Offsets are relative to the start of the
//! buffer; a zero length means the field is absent. The cooked host, path and
//! query references point inside the full URL.
//!
//! ```text
//!   0  flags u32, reserved u32
//!   8  connection id u64, request id u64, url context u64
//!  32  version major u16, minor u16, verb u32
//!  40  bytes received u64
//!  48  unknown verb, raw url, full url, host, abs path, query   6 x (u32, u32)
//!  96  remote address, local address                          2 x 20 bytes
//! 136  known request headers                                  41 x (u32, u32)
//! 464  unknown headers (count u32, offset u32)
//! 472  entity chunks (count u32, offset u32)
//! 480  variable area
//! ```
//!
//! An unknown header descriptor is four u32 (name offset and length, value
//! offset and length). An entity chunk descriptor is two u32.

use crate::protocol::{
    ApiError, ConnectionId, HeaderId, HttpVersion, REQUEST_HEADER_COUNT, RequestFlags, RequestHeaderId, RequestId,
    UrlContext, Verb,
};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

pub(crate) const FLAGS: usize = 0;
pub(crate) const CONNECTION_ID: usize = 8;
pub(crate) const REQUEST_ID: usize = 16;
pub(crate) const URL_CONTEXT: usize = 24;
pub(crate) const VERSION_MAJOR: usize = 32;
pub(crate) const VERSION_MINOR: usize = 34;
pub(crate) const VERB: usize = 36;
pub(crate) const BYTES_RECEIVED: usize = 40;
pub(crate) const UNKNOWN_VERB: usize = 48;
pub(crate) const RAW_URL: usize = 56;
pub(crate) const FULL_URL: usize = 64;
pub(crate) const HOST: usize = 72;
pub(crate) const ABS_PATH: usize = 80;
pub(crate) const QUERY: usize = 88;
pub(crate) const REMOTE_ADDR: usize = 96;
pub(crate) const LOCAL_ADDR: usize = 116;
pub(crate) const KNOWN_HEADERS: usize = 136;
pub(crate) const UNKNOWN_HEADERS: usize = KNOWN_HEADERS + REQUEST_HEADER_COUNT * REF_SIZE;
pub(crate) const ENTITY_CHUNKS: usize = UNKNOWN_HEADERS + REF_SIZE;

pub(crate) const REF_SIZE: usize = 8;
pub(crate) const ADDR_SIZE: usize = 20;
pub(crate) const UNKNOWN_HEADER_DESC_SIZE: usize = 16;
pub(crate) const ENTITY_CHUNK_DESC_SIZE: usize = 8;

pub(crate) const ADDR_FAMILY_V4: u16 = 4;
pub(crate) const ADDR_FAMILY_V6: u16 = 6;

/// Size of the fixed block. A receive buffer smaller than this is rejected
/// with [`ApiError::InsufficientBuffer`].
pub const REQUEST_FIXED_SIZE: usize = ENTITY_CHUNKS + REF_SIZE;

/// Read-only decoder over a request record filled in by a receive call.
///
/// References that fall outside the buffer read as absent, so a view over a
/// record that only has its fixed block populated is still usable.
#[derive(Clone, Copy)]
pub struct RequestView<'a> {
    buf: &'a [u8],
}

impl<'a> RequestView<'a> {
    pub fn new(buf: &'a [u8]) -> Result<Self, ApiError> {
        if buf.len() < REQUEST_FIXED_SIZE {
            return Err(ApiError::InsufficientBuffer { provided: buf.len(), required: REQUEST_FIXED_SIZE });
        }
        Ok(Self { buf })
    }

    fn u16_at(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.buf[at], self.buf[at + 1]])
    }

    fn u32_at(&self, at: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.buf[at..at + 4]);
        u32::from_le_bytes(b)
    }

    fn u64_at(&self, at: usize) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.buf[at..at + 8]);
        u64::from_le_bytes(b)
    }

    fn slice(&self, offset: u32, len: u32) -> Option<&'a [u8]> {
        if len == 0 {
            return None;
        }
        let start = offset as usize;
        let end = start.checked_add(len as usize)?;
        self.buf.get(start..end)
    }

    fn ref_at(&self, at: usize) -> Option<&'a [u8]> {
        self.slice(self.u32_at(at), self.u32_at(at + 4))
    }

    fn str_at(&self, at: usize) -> Option<&'a str> {
        self.ref_at(at).and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn flags(&self) -> RequestFlags {
        RequestFlags(self.u32_at(FLAGS))
    }

    pub fn more_entity_body(&self) -> bool {
        self.flags().contains(RequestFlags::MORE_ENTITY_BODY_EXISTS)
    }

    pub fn connection_id(&self) -> ConnectionId {
        ConnectionId(self.u64_at(CONNECTION_ID))
    }

    pub fn request_id(&self) -> RequestId {
        RequestId(self.u64_at(REQUEST_ID))
    }

    pub fn url_context(&self) -> UrlContext {
        self.u64_at(URL_CONTEXT)
    }

    pub fn version(&self) -> HttpVersion {
        HttpVersion { major: self.u16_at(VERSION_MAJOR), minor: self.u16_at(VERSION_MINOR) }
    }

    /// `None` for a code outside the verb table.
    pub fn verb(&self) -> Option<Verb> {
        Verb::from_code(self.u32_at(VERB))
    }

    pub fn bytes_received(&self) -> u64 {
        self.u64_at(BYTES_RECEIVED)
    }

    pub fn unknown_verb(&self) -> Option<&'a [u8]> {
        self.ref_at(UNKNOWN_VERB)
    }

    pub fn raw_url(&self) -> Option<&'a str> {
        self.str_at(RAW_URL)
    }

    pub fn full_url(&self) -> Option<&'a str> {
        self.str_at(FULL_URL)
    }

    pub fn host(&self) -> Option<&'a str> {
        self.str_at(HOST)
    }

    pub fn abs_path(&self) -> Option<&'a str> {
        self.str_at(ABS_PATH)
    }

    /// Includes the leading `?`.
    pub fn query(&self) -> Option<&'a str> {
        self.str_at(QUERY)
    }

    /// Offset of the cooked host, path or query relative to the full URL.
    pub fn offset_in_full_url(&self, part: &str) -> Option<usize> {
        let full = self.full_url()?;
        let start = (part.as_ptr() as usize).checked_sub(full.as_ptr() as usize)?;
        (start + part.len() <= full.len()).then_some(start)
    }

    fn addr_at(&self, at: usize) -> Option<SocketAddr> {
        let port = self.u16_at(at + 2);
        let ip = &self.buf[at + 4..at + ADDR_SIZE];
        match self.u16_at(at) {
            ADDR_FAMILY_V4 => Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(ip[0], ip[1], ip[2], ip[3])), port)),
            ADDR_FAMILY_V6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(ip);
                Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port))
            }
            _ => None,
        }
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.addr_at(REMOTE_ADDR)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr_at(LOCAL_ADDR)
    }

    pub fn known_header(&self, id: RequestHeaderId) -> Option<&'a [u8]> {
        self.ref_at(KNOWN_HEADERS + id.index() * REF_SIZE)
    }

    /// Unknown headers as `(name, value)` in arrival order.
    pub fn unknown_headers(&self) -> impl Iterator<Item = (&'a [u8], &'a [u8])> + 'a {
        let view = *self;
        let count = self.u32_at(UNKNOWN_HEADERS) as usize;
        let table = self.u32_at(UNKNOWN_HEADERS + 4) as usize;
        (0..count).map_while(move |i| {
            let at = table + i * UNKNOWN_HEADER_DESC_SIZE;
            if at + UNKNOWN_HEADER_DESC_SIZE > view.buf.len() {
                return None;
            }
            let name = view.slice(view.u32_at(at), view.u32_at(at + 4))?;
            let value = view.slice(view.u32_at(at + 8), view.u32_at(at + 12)).unwrap_or_default();
            Some((name, value))
        })
    }

    pub fn entity_chunks(&self) -> impl Iterator<Item = &'a [u8]> + 'a {
        let view = *self;
        let count = self.u32_at(ENTITY_CHUNKS) as usize;
        let table = self.u32_at(ENTITY_CHUNKS + 4) as usize;
        (0..count).map_while(move |i| {
            let at = table + i * ENTITY_CHUNK_DESC_SIZE;
            if at + ENTITY_CHUNK_DESC_SIZE > view.buf.len() {
                return None;
            }
            view.slice(view.u32_at(at), view.u32_at(at + 4))
        })
    }
}

impl std::fmt::Debug for RequestView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestView")
            .field("connection_id", &self.connection_id())
            .field("request_id", &self.request_id())
            .field("verb", &self.verb())
            .field("raw_url", &self.raw_url())
            .field("flags", &self.flags())
            .field("bytes_received", &self.bytes_received())
            .finish()
    }
}
