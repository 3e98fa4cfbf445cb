//! Core protocol types shared by the wire codecs, the queues and the
//! registration surface.
//!
//! - **Messages** ([`message`]): decoded heads and entity body chunks
//! - **Headers** ([`header`]): the fixed request/response header enumerations
//!   and the known/unknown [`HeaderTable`]
//! - **Requests** ([`request`]): [`RequestHead`] off the wire and the
//!   immutable [`ReceivedRequest`] snapshot parked in queues
//! - **Request records** ([`record`]): the byte layout receive calls write
//!   into caller buffers, read back with [`RequestView`]
//! - **Responses** ([`response`]): [`HttpResponse`] and its [`DataChunk`]s
//! - **URLs** ([`url`]): registration prefixes and cooked request URLs
//! - **Errors** ([`error`]): [`ApiError`] for callers, [`ParseError`] and
//!   [`SendError`] for the wire

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

pub mod header;
pub use header::HeaderId;
pub use header::HeaderTable;
pub use header::REQUEST_HEADER_COUNT;
pub use header::RequestHeaderId;
pub use header::RequestHeaders;
pub use header::ResponseHeaderId;
pub use header::ResponseHeaders;
pub use header::UnknownHeader;

mod ids;
pub use ids::ConnectionId;
pub use ids::ReceiveFlags;
pub use ids::RequestFlags;
pub use ids::RequestId;
pub use ids::SendFlags;
pub use ids::ServerSessionId;
pub use ids::UrlContext;
pub use ids::UrlGroupId;

mod verb;
pub use verb::Verb;

mod version;
pub use version::ApiVersion;
pub use version::HttpVersion;

pub mod url;
pub use url::CookedUrl;
pub use url::UrlPrefix;

mod request;
pub use request::ReceivedRequest;
pub use request::RequestHead;

mod response;
pub use response::DataChunk;
pub use response::HttpResponse;

pub mod record;
pub use record::REQUEST_FIXED_SIZE;
pub use record::RequestView;

mod error;
pub use error::ApiError;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
