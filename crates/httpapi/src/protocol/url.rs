//! URL prefixes accepted at registration time and the cooked URL attached to
//! every parsed request.

use crate::ensure;
use crate::protocol::{ApiError, ParseError};
use std::fmt;
use std::net::SocketAddr;
use std::ops::Range;

const SCHEME: &str = "http";
const SCHEME_SEPARATOR: &str = "://";

/// A request URL decomposed into host, absolute path and query.
///
/// All parts are byte ranges into one owned string, so the host always starts
/// right after `http://` and the query (when present) includes its leading `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookedUrl {
    full: String,
    host: Range<usize>,
    abs_path: Range<usize>,
    query: Option<Range<usize>>,
}

impl CookedUrl {
    /// Builds the cooked form of a request target.
    ///
    /// Absolute targets are decomposed as they are. Origin-form targets are
    /// prefixed with `http://` and the `Host` header, falling back to the
    /// local address of the connection when the header is absent or empty.
    pub fn from_target(target: &str, host_header: Option<&str>, local_addr: SocketAddr) -> Result<Self, ParseError> {
        if let Some(rest) = strip_scheme(target) {
            let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
            ensure!(authority_end > 0, ParseError::InvalidUri);

            let prefix_len = target.len() - rest.len();
            let (authority, tail) = rest.split_at(authority_end);
            let mut full = String::with_capacity(target.len() + 1);
            full.push_str(&target[..prefix_len]);
            full.push_str(authority);
            if !tail.starts_with('/') {
                full.push('/');
            }
            full.push_str(tail);
            return Ok(Self::split(full, prefix_len));
        }

        ensure!(target.starts_with('/'), ParseError::InvalidUri);

        let local;
        let host = match host_header.map(str::trim).filter(|h| !h.is_empty()) {
            Some(host) => host,
            None => {
                local = local_addr.to_string();
                &local
            }
        };

        let prefix_len = SCHEME.len() + SCHEME_SEPARATOR.len();
        let mut full = String::with_capacity(prefix_len + host.len() + target.len());
        full.push_str(SCHEME);
        full.push_str(SCHEME_SEPARATOR);
        full.push_str(host);
        full.push_str(target);
        Ok(Self::split(full, prefix_len))
    }

    // `full[host_start..]` is `authority` followed by a path starting with '/'.
    fn split(full: String, host_start: usize) -> Self {
        let path_start = full[host_start..].find('/').map_or(full.len(), |i| host_start + i);
        let query = full[path_start..].find('?').map(|i| path_start + i..full.len());
        let path_end = query.as_ref().map_or(full.len(), |q| q.start);
        Self { host: host_start..path_start, abs_path: path_start..path_end, query, full }
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    /// Host and optional port, as it appears in the full URL.
    pub fn host(&self) -> &str {
        &self.full[self.host.clone()]
    }

    pub fn abs_path(&self) -> &str {
        &self.full[self.abs_path.clone()]
    }

    pub fn query(&self) -> Option<&str> {
        self.query.clone().map(|q| &self.full[q])
    }

    pub fn host_range(&self) -> Range<usize> {
        self.host.clone()
    }

    pub fn abs_path_range(&self) -> Range<usize> {
        self.abs_path.clone()
    }

    pub fn query_range(&self) -> Option<Range<usize>> {
        self.query.clone()
    }

    /// The host without its port, brackets kept for IPv6 literals.
    pub fn hostname(&self) -> &str {
        split_host_port(self.host()).0
    }
}

fn strip_scheme(target: &str) -> Option<&str> {
    let (scheme, rest) = target.split_once(SCHEME_SEPARATOR)?;
    (scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")).then_some(rest)
}

/// Splits `host[:port]`, keeping `[v6]` literals intact.
fn split_host_port(authority: &str) -> (&str, Option<&str>) {
    let host_end = if authority.starts_with('[') {
        authority.find(']').map_or(authority.len(), |i| i + 1)
    } else {
        authority.find(':').unwrap_or(authority.len())
    };
    let (host, rest) = authority.split_at(host_end);
    (host, rest.strip_prefix(':'))
}

/// A validated `http://host:port/path/` registration.
///
/// Host and path are compared case-insensitively, so two prefixes differing
/// only in case are the same registration.
#[derive(Debug, Clone)]
pub struct UrlPrefix {
    original: String,
    host: String,
    port: u16,
    path: String,
}

impl UrlPrefix {
    pub fn parse(url: &str) -> Result<Self, ApiError> {
        let Some((scheme, rest)) = url.split_once(SCHEME_SEPARATOR) else {
            return Err(ApiError::invalid_argument(format!("missing scheme in {url}")));
        };
        ensure!(scheme.eq_ignore_ascii_case(SCHEME), ApiError::invalid_argument(format!("unsupported scheme {scheme}")));

        let Some(path_start) = rest.find('/') else {
            return Err(ApiError::invalid_argument(format!("missing path in {url}")));
        };
        let (authority, path) = rest.split_at(path_start);
        let (host, port) = split_host_port(authority);

        ensure!(!host.is_empty(), ApiError::invalid_argument(format!("missing host in {url}")));
        ensure!(host != "+" && host != "*", ApiError::invalid_argument(format!("wildcard host in {url}")));

        let port = match port {
            Some(port) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => port
                .parse::<u16>()
                .map_err(|_| ApiError::invalid_argument(format!("port out of range in {url}")))?,
            _ => return Err(ApiError::invalid_argument(format!("missing or invalid port in {url}"))),
        };
        ensure!(port != 0, ApiError::invalid_argument(format!("port 0 in {url}")));
        ensure!(path.ends_with('/'), ApiError::invalid_argument(format!("path must end with '/' in {url}")));
        ensure!(!path.contains(['?', '#']), ApiError::invalid_argument(format!("query or fragment in {url}")));

        Ok(Self { original: url.to_string(), host: host.to_ascii_lowercase(), port, path: path.to_ascii_lowercase() })
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Host name as given, lowercased and without brackets removed.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Same registration under case-insensitive comparison.
    pub fn same_as(&self, other: &UrlPrefix) -> bool {
        self.port == other.port && self.host == other.host && self.path == other.path
    }

    /// Whether a request for `hostname` on local `port` with `abs_path` falls
    /// under this prefix. `/app` matches the prefix `/app/`.
    pub fn matches(&self, hostname: &str, port: u16, abs_path: &str) -> bool {
        if self.port != port || !self.host.eq_ignore_ascii_case(hostname) {
            return false;
        }
        let path = self.path.as_bytes();
        let candidate = abs_path.as_bytes();
        if candidate.len() >= path.len() {
            candidate[..path.len()].eq_ignore_ascii_case(path)
        } else {
            candidate.len() + 1 == path.len() && candidate.eq_ignore_ascii_case(&path[..candidate.len()])
        }
    }

    /// Length of the matched path, used to prefer the longest prefix.
    pub fn specificity(&self) -> usize {
        self.path.len()
    }
}

impl fmt::Display for UrlPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}
