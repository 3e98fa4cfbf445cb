//! An asynchronous HTTP request queue server with completion based delivery.
//!
//! Applications register URL prefixes; the engine accepts TCP connections on
//! the registered ports, parses HTTP/1.1 requests and parks each one in the
//! request queue its URL routes to. Consumers pull requests out of a queue
//! into their own buffers, read entity bodies on demand and send a response
//! back for the same request id. Every receive and send has an awaiting form
//! and an overlapped form that completes through an [`completion::Overlapped`]
//! object and, optionally, a [`completion::CompletionPort`].
//!
//! # Example
//!
//! ```no_run
//! use micro_httpapi::engine::Engine;
//! use micro_httpapi::protocol::{
//!     ApiVersion, HttpResponse, ReceiveFlags, RequestId, RequestView, ResponseHeaderId, SendFlags,
//! };
//! use tracing::{error, info};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = match Engine::new(ApiVersion::V1) {
//!         Ok(engine) => engine,
//!         Err(e) => {
//!             error!(cause = %e, "engine error");
//!             return;
//!         }
//!     };
//!     let queue = engine.create_http_handle().unwrap();
//!     engine.add_url(&queue, "http://localhost:8080/").await.unwrap();
//!
//!     let mut buf = vec![0u8; 4096];
//!     loop {
//!         let n = match queue.receive_request(RequestId::NULL, ReceiveFlags::NONE, &mut buf).await {
//!             Ok(n) => n,
//!             Err(e) => {
//!                 error!(cause = %e, "receive failed");
//!                 continue;
//!             }
//!         };
//!         let request = RequestView::new(&buf[..n]).unwrap();
//!         info!(url = request.full_url(), "receiving request");
//!
//!         let response = HttpResponse::new(200)
//!             .with_header(ResponseHeaderId::ContentLength, "14")
//!             .with_chunk("Hello World!\r\n");
//!         let _ = queue.send_response(request.request_id(), SendFlags::NONE, response).await;
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`engine`]: version negotiation, queues, sessions, URL groups and registrations
//! - [`queue`]: request queues and their receive/send operations
//! - [`completion`]: overlapped objects and completion ports
//! - [`routing`]: the prefix table requests are routed through
//! - [`connection`]: the per-connection parse, park and respond cycle
//! - [`codec`]: the wire decoder, the response head encoder and the request record encoder
//! - [`protocol`]: shared types, the request record layout and the error taxonomy
//! - [`handler`]: the dispatch seam between connections and queues
//!
//! # Limitations
//!
//! - HTTP/1.x over plain TCP only
//! - Maximum header size 8KB and 64 headers by default, see [`engine::EngineConfig`]
//! - `Content-Length` of responses is written as given, never computed

pub mod codec;
pub mod completion;
pub mod connection;
pub mod engine;
pub mod handler;
pub mod protocol;
pub mod queue;
pub mod routing;

mod listener;
mod utils;
pub(crate) use utils::ensure;
