use crate::protocol::ParseError;
use std::fmt;

/// Protocol version of a request line or status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HttpVersion {
    pub major: u16,
    pub minor: u16,
}

impl HttpVersion {
    pub const HTTP_10: HttpVersion = HttpVersion { major: 1, minor: 0 };
    pub const HTTP_11: HttpVersion = HttpVersion { major: 1, minor: 1 };

    /// Maps the minor digit reported by httparse for an `HTTP/1.x` line.
    pub(crate) fn from_httparse(minor: Option<u8>) -> Result<Self, ParseError> {
        match minor {
            Some(0) => Ok(Self::HTTP_10),
            Some(1) => Ok(Self::HTTP_11),
            other => Err(ParseError::InvalidVersion(other)),
        }
    }

    /// Connections default to persistent from 1.1 on.
    pub fn keep_alive_by_default(self) -> bool {
        self >= Self::HTTP_11
    }
}

impl Default for HttpVersion {
    fn default() -> Self {
        Self::HTTP_11
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// Version of the programming surface negotiated when creating an engine,
/// a server session or a request queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    pub major: u16,
    pub minor: u16,
}

impl ApiVersion {
    /// Queue-bound registration with context zero.
    pub const V1: ApiVersion = ApiVersion { major: 1, minor: 0 };
    /// Sessions, URL groups and per-URL context values.
    pub const V2: ApiVersion = ApiVersion { major: 2, minor: 0 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    pub fn is_supported(self) -> bool {
        self == Self::V1 || self == Self::V2
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_version_display() {
        assert_eq!(HttpVersion::HTTP_11.to_string(), "HTTP/1.1");
        assert_eq!(HttpVersion::HTTP_10.to_string(), "HTTP/1.0");
        assert!(!HttpVersion::HTTP_10.keep_alive_by_default());
    }

    #[test]
    fn only_one_and_two_are_supported() {
        assert!(ApiVersion::V1.is_supported());
        assert!(ApiVersion::V2.is_supported());
        assert!(!ApiVersion::new(1, 1).is_supported());
        assert!(!ApiVersion::new(3, 0).is_supported());
    }
}
