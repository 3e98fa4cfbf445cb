//! Request verbs with a fixed numeric code used in the request record.

/// The known verb set. Anything else parses as [`Verb::Unknown`] and the raw
/// token is kept next to it on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Verb {
    Unknown = 1,
    Options = 3,
    Get = 4,
    Head = 5,
    Post = 6,
    Put = 7,
    Delete = 8,
    Trace = 9,
    Connect = 10,
    Track = 11,
    Move = 12,
    Copy = 13,
    Propfind = 14,
    Proppatch = 15,
    Mkcol = 16,
    Lock = 17,
    Unlock = 18,
    Search = 19,
}

const KNOWN_VERBS: [(&[u8], Verb); 17] = [
    (b"OPTIONS", Verb::Options),
    (b"GET", Verb::Get),
    (b"HEAD", Verb::Head),
    (b"POST", Verb::Post),
    (b"PUT", Verb::Put),
    (b"DELETE", Verb::Delete),
    (b"TRACE", Verb::Trace),
    (b"CONNECT", Verb::Connect),
    (b"TRACK", Verb::Track),
    (b"MOVE", Verb::Move),
    (b"COPY", Verb::Copy),
    (b"PROPFIND", Verb::Propfind),
    (b"PROPPATCH", Verb::Proppatch),
    (b"MKCOL", Verb::Mkcol),
    (b"LOCK", Verb::Lock),
    (b"UNLOCK", Verb::Unlock),
    (b"SEARCH", Verb::Search),
];

impl Verb {
    /// Matches a request-line token. Verbs are case sensitive.
    pub fn from_token(token: &[u8]) -> Self {
        KNOWN_VERBS.iter().find(|(name, _)| *name == token).map_or(Verb::Unknown, |(_, verb)| *verb)
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        if code == Verb::Unknown.code() {
            return Some(Verb::Unknown);
        }
        KNOWN_VERBS.iter().map(|(_, verb)| *verb).find(|verb| verb.code() == code)
    }

    pub fn as_str(self) -> Option<&'static str> {
        KNOWN_VERBS
            .iter()
            .find(|(_, verb)| *verb == self)
            .and_then(|(name, _)| std::str::from_utf8(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tokens() {
        assert_eq!(Verb::from_token(b"GET"), Verb::Get);
        assert_eq!(Verb::from_token(b"PROPPATCH"), Verb::Proppatch);
        assert_eq!(Verb::Post.as_str(), Some("POST"));
    }

    #[test]
    fn unknown_and_case_sensitive() {
        assert_eq!(Verb::from_token(b"xyzzy"), Verb::Unknown);
        assert_eq!(Verb::from_token(b"get"), Verb::Unknown);
        assert_eq!(Verb::Unknown.as_str(), None);
    }

    #[test]
    fn code_mapping() {
        for verb in [Verb::Unknown, Verb::Get, Verb::Search] {
            assert_eq!(Verb::from_code(verb.code()), Some(verb));
        }
        assert_eq!(Verb::from_code(0), None);
        assert_eq!(Verb::from_code(2), None);
    }
}
