//! Wire and record codecs.
//!
//! - [`RequestDecoder`]: request heads and entity body chunks off a
//!   connection's byte stream (`tokio_util::codec::Decoder`)
//! - [`HeaderEncoder`]: the status line and header block of a response
//! - [`RecordEncoder`]: a parsed request into the request record layout that
//!   receive calls copy into caller buffers

mod body;
mod header;
mod record_encoder;
mod request_decoder;

pub use header::DEFAULT_MAX_HEADER_BYTES;
pub use header::DEFAULT_MAX_HEADERS;
pub use header::HeaderDecoder;
pub use header::HeaderEncoder;
pub use record_encoder::RecordEncoder;
pub use record_encoder::RequestRecord;
pub use record_encoder::record_size;
pub use request_decoder::RequestDecoder;
