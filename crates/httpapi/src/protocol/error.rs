use std::io;
use thiserror::Error;

/// Errors returned by the queue, registration and completion surfaces.
///
/// `InsufficientBuffer` and `MoreData` are sizing conditions rather than
/// failures: the caller retries with a larger buffer (and, for `MoreData`,
/// with the request id that is now bound).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("url prefix already registered: {prefix}")]
    AlreadyExists { prefix: String },

    #[error("url prefix not registered: {prefix}")]
    NotFound { prefix: String },

    #[error("invalid or closed handle")]
    InvalidHandle,

    #[error("request id does not refer to a live connection")]
    ConnectionInvalid,

    #[error("buffer of {provided} bytes is smaller than the fixed request structure of {required} bytes")]
    InsufficientBuffer { provided: usize, required: usize },

    #[error("buffer too small, {required} bytes required")]
    MoreData { required: usize },

    #[error("unsupported api version {major}.{minor}")]
    RevisionMismatch { major: u16, minor: u16 },

    #[error("operation is still pending")]
    Incomplete,

    #[error("wait timed out")]
    Timeout,

    #[error("operation aborted")]
    Aborted,

    #[error("entity body is exhausted")]
    EndOfBody,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ApiError {
    pub fn invalid_argument<S: ToString>(str: S) -> Self {
        Self::InvalidArgument { reason: str.to_string() }
    }

    pub fn already_exists<S: ToString>(prefix: S) -> Self {
        Self::AlreadyExists { prefix: prefix.to_string() }
    }

    pub fn not_found<S: ToString>(prefix: S) -> Self {
        Self::NotFound { prefix: prefix.to_string() }
    }

    /// Returns true for the buffer negotiation outcomes a caller is expected to retry.
    pub fn is_buffer_sizing(&self) -> bool {
        matches!(self, Self::InsufficientBuffer { .. } | Self::MoreData { .. })
    }

    /// Errors carried through completion notifications must be cloneable,
    /// io errors are flattened to their kind and message.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::InvalidArgument { reason } => Self::InvalidArgument { reason: reason.clone() },
            Self::AlreadyExists { prefix } => Self::AlreadyExists { prefix: prefix.clone() },
            Self::NotFound { prefix } => Self::NotFound { prefix: prefix.clone() },
            Self::InvalidHandle => Self::InvalidHandle,
            Self::ConnectionInvalid => Self::ConnectionInvalid,
            Self::InsufficientBuffer { provided, required } => {
                Self::InsufficientBuffer { provided: *provided, required: *required }
            }
            Self::MoreData { required } => Self::MoreData { required: *required },
            Self::RevisionMismatch { major, minor } => Self::RevisionMismatch { major: *major, minor: *minor },
            Self::Incomplete => Self::Incomplete,
            Self::Timeout => Self::Timeout,
            Self::Aborted => Self::Aborted,
            Self::EndOfBody => Self::EndOfBody,
            Self::Io { source } => Self::Io { source: io::Error::new(source.kind(), source.to_string()) },
        }
    }
}

impl From<SendError> for ApiError {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io { source } => Self::Io { source },
            SendError::ConnectionClosed => Self::ConnectionInvalid,
            SendError::InvalidResponse { reason } => Self::InvalidArgument { reason },
        }
    }
}

/// Why a connection task stopped serving its peer.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },

    #[error("connection already closed")]
    ConnectionClosed,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_response<S: ToString>(str: S) -> Self {
        Self::InvalidResponse { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
