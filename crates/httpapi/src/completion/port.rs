use crate::completion::Overlapped;
use crate::protocol::ApiError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time;

/// A completion notification dequeued from a [`CompletionPort`].
#[derive(Debug)]
pub struct CompletionPacket {
    /// The key given when the queue was associated with the port.
    pub key: u64,
    pub bytes: usize,
    pub status: Result<usize, ApiError>,
    /// The object the operation was issued with; compare with [`Overlapped::ptr_eq`].
    pub overlapped: Overlapped,
}

/// Multiplexed completion queue shared by any number of request queues.
///
/// Packets are delivered in completion order. Concurrent dequeuers are served
/// in the order they started waiting.
#[derive(Clone)]
pub struct CompletionPort {
    inner: Arc<PortInner>,
}

struct PortInner {
    tx: mpsc::UnboundedSender<CompletionPacket>,
    rx: Mutex<mpsc::UnboundedReceiver<CompletionPacket>>,
}

impl CompletionPort {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { inner: Arc::new(PortInner { tx, rx: Mutex::new(rx) }) }
    }

    /// Takes the next packet.
    ///
    /// `None` waits forever, `Some(Duration::ZERO)` only polls. Either way an
    /// expired wait reports [`ApiError::Timeout`].
    pub async fn dequeue(&self, timeout: Option<Duration>) -> Result<CompletionPacket, ApiError> {
        let mut rx = match timeout {
            Some(Duration::ZERO) => self.inner.rx.try_lock().map_err(|_| ApiError::Timeout)?,
            _ => self.inner.rx.lock().await,
        };

        match timeout {
            Some(Duration::ZERO) => rx.try_recv().map_err(|_| ApiError::Timeout),
            Some(duration) => match time::timeout(duration, rx.recv()).await {
                Ok(Some(packet)) => Ok(packet),
                Ok(None) => Err(ApiError::InvalidHandle),
                Err(_) => Err(ApiError::Timeout),
            },
            None => rx.recv().await.ok_or(ApiError::InvalidHandle),
        }
    }

    pub(crate) fn post(&self, packet: CompletionPacket) {
        // the port holds its own receiver, so the send cannot fail
        let _ = self.inner.tx.send(packet);
    }
}

impl Default for CompletionPort {
    fn default() -> Self {
        Self::new()
    }
}

/// A queue's association with a port.
#[derive(Clone)]
pub(crate) struct PortBinding {
    pub(crate) port: CompletionPort,
    pub(crate) key: u64,
}
