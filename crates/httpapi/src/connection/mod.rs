//! Per-connection serving.
//!
//! [`HttpConnection`] owns the read half of an accepted socket and runs the
//! parse, park, respond cycle. The write half lives in state shared with the
//! queue that holds the connection's current request, so that queue calls can
//! pull entity body bytes and write the response through a [`MessageWriter`].

mod http_connection;
mod message_writer;
mod shared;

pub use http_connection::HttpConnection;
pub use message_writer::MessageWriter;
pub(crate) use shared::ConnectionShared;
