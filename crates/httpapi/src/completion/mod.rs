//! Completion fabric for overlapped operations.
//!
//! Every asynchronous queue operation is issued with an [`Overlapped`] and
//! completes exactly once. When the issuing queue is associated with a
//! [`CompletionPort`], the completion is also posted there as a
//! [`CompletionPacket`] carrying the association key.

mod overlapped;
mod port;

pub use overlapped::Overlapped;
pub(crate) use overlapped::Completion;
pub use port::CompletionPacket;
pub use port::CompletionPort;
pub(crate) use port::PortBinding;
