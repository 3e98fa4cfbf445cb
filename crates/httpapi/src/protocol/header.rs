//! Known-header enumerations and the known/unknown header table.
//!
//! Requests and responses each have a fixed set of known headers addressed by
//! index. Every other header lands in an ordered unknown-header list. The
//! request and response sets share their first twenty entries (general and
//! entity headers) and diverge afterwards.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::marker::PhantomData;

/// A fixed header enumeration usable as the index space of a [`HeaderTable`].
pub trait HeaderId: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// All members in index order.
    const ALL: &'static [Self];

    fn index(self) -> usize;

    fn name(self) -> &'static str;

    fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Case-insensitive lookup by header name.
    fn from_name(name: &[u8]) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.name().as_bytes().eq_ignore_ascii_case(name))
    }
}

macro_rules! header_ids {
    ($(#[$meta:meta])* $enum_name:ident { $($variant:ident => $name:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $enum_name {
            $($variant,)+
        }

        impl HeaderId for $enum_name {
            const ALL: &'static [Self] = &[$($enum_name::$variant,)+];

            fn index(self) -> usize {
                self as usize
            }

            fn name(self) -> &'static str {
                match self {
                    $($enum_name::$variant => $name,)+
                }
            }
        }
    };
}

header_ids! {
    /// Known request headers.
    RequestHeaderId {
        CacheControl => "Cache-Control",
        Connection => "Connection",
        Date => "Date",
        KeepAlive => "Keep-Alive",
        Pragma => "Pragma",
        Trailer => "Trailer",
        TransferEncoding => "Transfer-Encoding",
        Upgrade => "Upgrade",
        Via => "Via",
        Warning => "Warning",
        Allow => "Allow",
        ContentLength => "Content-Length",
        ContentType => "Content-Type",
        ContentEncoding => "Content-Encoding",
        ContentLanguage => "Content-Language",
        ContentLocation => "Content-Location",
        ContentMd5 => "Content-MD5",
        ContentRange => "Content-Range",
        Expires => "Expires",
        LastModified => "Last-Modified",
        Accept => "Accept",
        AcceptCharset => "Accept-Charset",
        AcceptEncoding => "Accept-Encoding",
        AcceptLanguage => "Accept-Language",
        Authorization => "Authorization",
        Cookie => "Cookie",
        Expect => "Expect",
        From => "From",
        Host => "Host",
        IfMatch => "If-Match",
        IfModifiedSince => "If-Modified-Since",
        IfNoneMatch => "If-None-Match",
        IfRange => "If-Range",
        IfUnmodifiedSince => "If-Unmodified-Since",
        MaxForwards => "Max-Forwards",
        ProxyAuthorization => "Proxy-Authorization",
        Referer => "Referer",
        Range => "Range",
        Te => "TE",
        Translate => "Translate",
        UserAgent => "User-Agent",
    }
}

header_ids! {
    /// Known response headers.
    ResponseHeaderId {
        CacheControl => "Cache-Control",
        Connection => "Connection",
        Date => "Date",
        KeepAlive => "Keep-Alive",
        Pragma => "Pragma",
        Trailer => "Trailer",
        TransferEncoding => "Transfer-Encoding",
        Upgrade => "Upgrade",
        Via => "Via",
        Warning => "Warning",
        Allow => "Allow",
        ContentLength => "Content-Length",
        ContentType => "Content-Type",
        ContentEncoding => "Content-Encoding",
        ContentLanguage => "Content-Language",
        ContentLocation => "Content-Location",
        ContentMd5 => "Content-MD5",
        ContentRange => "Content-Range",
        Expires => "Expires",
        LastModified => "Last-Modified",
        AcceptRanges => "Accept-Ranges",
        Age => "Age",
        Etag => "ETag",
        Location => "Location",
        ProxyAuthenticate => "Proxy-Authenticate",
        RetryAfter => "Retry-After",
        Server => "Server",
        SetCookie => "Set-Cookie",
        Vary => "Vary",
        WwwAuthenticate => "WWW-Authenticate",
    }
}

/// Number of known request headers, i.e. slots in the request record's header table.
pub const REQUEST_HEADER_COUNT: usize = RequestHeaderId::ALL.len();

/// A header whose name is not part of the known enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownHeader {
    pub name: Bytes,
    pub value: Bytes,
}

/// Known headers by index plus unknown headers in insertion order.
///
/// Setting a known header that is already present replaces its value, so the
/// last occurrence on the wire wins.
#[derive(Clone, PartialEq, Eq)]
pub struct HeaderTable<H> {
    known: Vec<Option<Bytes>>,
    unknown: Vec<UnknownHeader>,
    _id: PhantomData<H>,
}

pub type RequestHeaders = HeaderTable<RequestHeaderId>;
pub type ResponseHeaders = HeaderTable<ResponseHeaderId>;

impl<H: HeaderId> HeaderTable<H> {
    pub fn new() -> Self {
        Self { known: vec![None; H::ALL.len()], unknown: Vec::new(), _id: PhantomData }
    }

    pub fn get(&self, id: H) -> Option<&Bytes> {
        self.known[id.index()].as_ref()
    }

    pub fn contains(&self, id: H) -> bool {
        self.known[id.index()].is_some()
    }

    pub fn set(&mut self, id: H, value: impl Into<Bytes>) {
        self.known[id.index()] = Some(value.into());
    }

    pub fn remove(&mut self, id: H) -> Option<Bytes> {
        self.known[id.index()].take()
    }

    pub fn push_unknown(&mut self, name: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.unknown.push(UnknownHeader { name: name.into(), value: value.into() });
    }

    /// Routes a header to its known slot when the name matches, otherwise
    /// appends it to the unknown list.
    pub fn insert(&mut self, name: &[u8], value: impl Into<Bytes>) {
        match H::from_name(name) {
            Some(id) => self.set(id, value),
            None => self.push_unknown(Bytes::copy_from_slice(name), value),
        }
    }

    /// Present known headers in enumeration order.
    pub fn known(&self) -> impl Iterator<Item = (H, &Bytes)> + '_ {
        H::ALL.iter().zip(self.known.iter()).filter_map(|(id, value)| value.as_ref().map(|v| (*id, v)))
    }

    pub fn unknown(&self) -> &[UnknownHeader] {
        &self.unknown
    }

    /// Checks a known header value for a comma separated token, case-insensitively.
    pub fn has_token(&self, id: H, token: &str) -> bool {
        self.get(id).is_some_and(|value| {
            value.split(|b| *b == b',').any(|item| item.trim_ascii().eq_ignore_ascii_case(token.as_bytes()))
        })
    }
}

impl<H: HeaderId> Default for HeaderTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HeaderId> fmt::Debug for HeaderTable<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (id, value) in self.known() {
            map.entry(&id.name(), &String::from_utf8_lossy(value));
        }
        for header in &self.unknown {
            map.entry(&String::from_utf8_lossy(&header.name), &String::from_utf8_lossy(&header.value));
        }
        map.finish()
    }
}

/// Trims a raw header value and collapses internal runs of spaces and tabs
/// into a single space.
pub(crate) fn normalize_value(raw: &[u8]) -> Bytes {
    let trimmed = raw.trim_ascii();
    if !trimmed.windows(2).any(|w| is_lws(w[0]) && is_lws(w[1])) && !trimmed.contains(&b'\t') {
        return Bytes::copy_from_slice(trimmed);
    }

    let mut value = BytesMut::with_capacity(trimmed.len());
    let mut in_space = false;
    for &b in trimmed {
        if is_lws(b) {
            if !in_space {
                value.put_u8(b' ');
            }
            in_space = true;
        } else {
            value.put_u8(b);
            in_space = false;
        }
    }
    value.freeze()
}

#[inline]
fn is_lws(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_indexed_in_order() {
        assert_eq!(REQUEST_HEADER_COUNT, 41);
        assert_eq!(RequestHeaderId::Connection.index(), 1);
        assert_eq!(RequestHeaderId::ContentLength.index(), 11);
        assert_eq!(RequestHeaderId::Host.index(), 28);
        assert_eq!(RequestHeaderId::UserAgent.index(), 40);
        assert_eq!(ResponseHeaderId::RetryAfter.index(), 25);
        assert_eq!(ResponseHeaderId::ALL.len(), 30);
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        assert_eq!(RequestHeaderId::from_name(b"user-agent"), Some(RequestHeaderId::UserAgent));
        assert_eq!(RequestHeaderId::from_name(b"HOST"), Some(RequestHeaderId::Host));
        assert_eq!(RequestHeaderId::from_name(b"Retry-After"), None);
        assert_eq!(ResponseHeaderId::from_name(b"retry-after"), Some(ResponseHeaderId::RetryAfter));
    }

    #[test]
    fn last_known_occurrence_wins() {
        let mut headers = RequestHeaders::new();
        headers.insert(b"Accept", "text/html");
        headers.insert(b"accept", "*/*");
        assert_eq!(headers.get(RequestHeaderId::Accept).map(|v| &v[..]), Some(&b"*/*"[..]));
        assert_eq!(headers.known().count(), 1);
    }

    #[test]
    fn unknown_headers_keep_arrival_order() {
        let mut headers = RequestHeaders::new();
        headers.insert(b"Qux", "1");
        headers.insert(b"Host", "localhost");
        headers.insert(b"Abc", "2");
        headers.insert(b"Qux", "3");

        let names: Vec<_> = headers.unknown().iter().map(|h| h.name.clone()).collect();
        assert_eq!(names, vec![Bytes::from("Qux"), Bytes::from("Abc"), Bytes::from("Qux")]);
    }

    #[test]
    fn value_normalization() {
        assert_eq!(normalize_value(b"foo  baz "), Bytes::from("foo baz"));
        assert_eq!(normalize_value(b" foo baz"), Bytes::from("foo baz"));
        assert_eq!(normalize_value(b"a\t\tb"), Bytes::from("a b"));
        assert_eq!(normalize_value(b"keep-alive"), Bytes::from("keep-alive"));
        assert_eq!(normalize_value(b"   "), Bytes::new());
    }

    #[test]
    fn token_lookup() {
        let mut headers = ResponseHeaders::new();
        headers.set(ResponseHeaderId::Connection, "Upgrade, close");
        assert!(headers.has_token(ResponseHeaderId::Connection, "close"));
        assert!(!headers.has_token(ResponseHeaderId::Connection, "keep-alive"));
    }
}
