//! State of one connection shared between its task and the queue that parked
//! its current request.
//!
//! The connection task feeds entity body bytes in and waits for the response;
//! queue operations take body bytes out and write the response. The std mutex
//! guards the body and progress fields and is never held across an await. The
//! writer sits behind its own async mutex.

use crate::connection::MessageWriter;
use crate::protocol::{ApiError, ConnectionId, HttpResponse, RequestId, SendError};
use bytes::{Bytes, BytesMut};
use std::cmp;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncWrite;
use tokio::sync::Notify;
use tracing::{debug, trace};

pub(crate) type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) struct ConnectionShared {
    id: ConnectionId,
    state: Mutex<ConnState>,
    notify: Notify,
    writer: tokio::sync::Mutex<MessageWriter<BoxWriter>>,
}

#[derive(Default)]
struct ConnState {
    /// Request whose body and response this connection is serving.
    current: Option<RequestId>,
    /// Body bytes that arrived and were not handed out yet.
    body: BytesMut,
    body_done: bool,
    /// Head plus body bytes received for `current`.
    bytes_received: u64,
    /// Set once the response for the request has been written.
    sent: Option<(RequestId, bool)>,
    closed: bool,
}

impl ConnectionShared {
    pub(crate) fn new(id: ConnectionId, writer: BoxWriter, write_capacity: usize) -> Self {
        Self {
            id,
            state: Mutex::new(ConnState::default()),
            notify: Notify::new(),
            writer: tokio::sync::Mutex::new(MessageWriter::with_capacity(writer, write_capacity)),
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, ConnState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits until `check` yields a value. The waiter is registered before the
    /// check so that no notification in between is lost.
    async fn wait_until<T>(&self, mut check: impl FnMut(&mut ConnState) -> Option<T>) -> T {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(value) = check(&mut *self.lock()) {
                return value;
            }
            notified.await;
        }
    }

    pub(crate) fn begin_request(&self, id: RequestId, head_len: usize, has_body: bool) {
        let mut state = self.lock();
        state.current = Some(id);
        state.body.clear();
        state.body_done = !has_body;
        state.bytes_received = head_len as u64;
        state.sent = None;
    }

    /// Buffers body bytes for the current request. Bytes arriving after the
    /// response was sent are dropped.
    pub(crate) fn push_body(&self, chunk: &[u8]) {
        let mut state = self.lock();
        if state.current.is_none() {
            trace!(conn_id = %self.id, len = chunk.len(), "discard body bytes");
            return;
        }
        state.body.extend_from_slice(chunk);
        state.bytes_received += chunk.len() as u64;
        drop(state);
        self.notify.notify_waiters();
    }

    pub(crate) fn finish_body(&self) {
        self.lock().body_done = true;
        self.notify.notify_waiters();
    }

    /// Waits until the body buffer has room below `cap`, or nobody will read it anymore.
    pub(crate) async fn wait_body_room(&self, cap: usize) {
        self.wait_until(|s| (s.current.is_none() || s.closed || s.body.len() < cap).then_some(())).await
    }

    /// `(bytes received, more entity body exists)` for a request this connection serves.
    pub(crate) fn body_progress(&self, id: RequestId) -> Option<(u64, bool)> {
        let state = self.lock();
        if state.closed || state.current != Some(id) {
            return None;
        }
        Some((state.bytes_received, !state.body_done || !state.body.is_empty()))
    }

    /// Takes up to `max` buffered body bytes without waiting.
    ///
    /// `Ok(None)` means the body is not exhausted but nothing is buffered yet.
    pub(crate) fn try_take_body(&self, id: RequestId, max: usize) -> Result<Option<Bytes>, ApiError> {
        let mut state = self.lock();
        let taken = Self::take_locked(&mut state, id, max);
        drop(state);
        if matches!(taken, Ok(Some(_))) {
            self.notify.notify_waiters();
        }
        taken
    }

    fn take_locked(state: &mut ConnState, id: RequestId, max: usize) -> Result<Option<Bytes>, ApiError> {
        if state.closed || state.current != Some(id) {
            return Err(ApiError::ConnectionInvalid);
        }
        if !state.body.is_empty() {
            let len = cmp::min(max, state.body.len());
            return Ok(Some(state.body.split_to(len).freeze()));
        }
        if state.body_done {
            return Err(ApiError::EndOfBody);
        }
        Ok(None)
    }

    /// Waits for body bytes and takes up to `max` of them.
    pub(crate) async fn read_body(&self, id: RequestId, max: usize) -> Result<Bytes, ApiError> {
        let taken = self.wait_until(|s| Self::take_locked(s, id, max).transpose()).await;
        // readers below the cap may be waiting for room
        self.notify.notify_waiters();
        taken
    }

    pub(crate) async fn write_response(&self, response: HttpResponse) -> Result<usize, SendError> {
        if self.is_closed() {
            return Err(SendError::ConnectionClosed);
        }
        let mut writer = self.writer.lock().await;
        writer.write_response(response).await
    }

    pub(crate) async fn write_continue(&self) -> Result<(), SendError> {
        self.writer.lock().await.write_continue().await
    }

    pub(crate) async fn shutdown_write(&self) -> Result<(), SendError> {
        self.writer.lock().await.shutdown().await
    }

    /// Records that the response for `id` is on the wire, releasing the connection
    /// to read the next request.
    pub(crate) fn response_sent(&self, id: RequestId, close: bool) {
        let mut state = self.lock();
        if state.current == Some(id) {
            state.current = None;
            state.body.clear();
        }
        state.sent = Some((id, close));
        drop(state);
        debug!(conn_id = %self.id, request_id = %id, close, "response sent");
        self.notify.notify_waiters();
    }

    /// Resolves with the close flag once the response for `id` was sent, or
    /// `None` when the connection is aborted first.
    pub(crate) async fn wait_response_sent(&self, id: RequestId) -> Option<bool> {
        self.wait_until(|s| {
            if s.closed {
                return Some(None);
            }
            match s.sent {
                Some((sent, close)) if sent == id => Some(Some(close)),
                _ => None,
            }
        })
        .await
    }

    pub(crate) fn abort(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.current = None;
        state.body.clear();
        drop(state);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) async fn aborted(&self) {
        self.wait_until(|s| s.closed.then_some(())).await
    }
}
