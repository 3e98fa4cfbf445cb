//! Request head decoding and response head encoding.
//!
//! - [`HeaderDecoder`]: request line and header block into a `RequestHead`,
//!   bounded by a header count and a head size limit
//! - [`HeaderEncoder`]: status line and header block of an `HttpResponse`

mod header_decoder;
mod header_encoder;

pub use header_decoder::DEFAULT_MAX_HEADER_BYTES;
pub use header_decoder::DEFAULT_MAX_HEADERS;
pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
