use crate::completion::port::{CompletionPacket, PortBinding};
use crate::protocol::ApiError;
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::trace;

/// Completion object for one asynchronous operation at a time.
///
/// Issue an overlapped call with it, then either poll [`Overlapped::result`]
/// (which reports [`ApiError::Incomplete`] while the operation runs), await
/// [`Overlapped::wait`], or dequeue the completion packet from the port the
/// queue is associated with. Clones refer to the same object.
#[derive(Clone)]
pub struct Overlapped {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<OpState>,
    cancel: Mutex<CancellationToken>,
}

enum OpState {
    Idle,
    Pending,
    Complete { result: Result<usize, ApiError>, data: Bytes },
}

impl Overlapped {
    pub fn new() -> Self {
        let (state, _) = watch::channel(OpState::Idle);
        Self { inner: Arc::new(Inner { state, cancel: Mutex::new(CancellationToken::new()) }) }
    }

    /// Bytes transferred by the completed operation, or its error.
    pub fn result(&self) -> Result<usize, ApiError> {
        match &*self.inner.state.borrow() {
            OpState::Idle => Err(ApiError::invalid_argument("no operation issued")),
            OpState::Pending => Err(ApiError::Incomplete),
            OpState::Complete { result, .. } => duplicate(result),
        }
    }

    /// Waits until the operation completes and returns its result.
    pub async fn wait(&self) -> Result<usize, ApiError> {
        let mut rx = self.inner.state.subscribe();
        let state = rx.wait_for(|s| !matches!(s, OpState::Pending)).await.map_err(|_| ApiError::Aborted)?;
        match &*state {
            OpState::Idle => Err(ApiError::invalid_argument("no operation issued")),
            OpState::Pending => Err(ApiError::Incomplete),
            OpState::Complete { result, .. } => duplicate(result),
        }
    }

    /// Bytes the completed operation produced: the request record for a
    /// receive, the body bytes for an entity-body receive. Also filled when a
    /// receive completes with [`ApiError::MoreData`].
    pub fn data(&self) -> Option<Bytes> {
        match &*self.inner.state.borrow() {
            OpState::Complete { data, .. } => Some(data.clone()),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.inner.state.borrow(), OpState::Pending)
    }

    /// Whether both handles refer to the same completion object.
    pub fn ptr_eq(&self, other: &Overlapped) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Marks the object pending and hands out the one-shot token that completes it.
    pub(crate) fn begin(&self, port: Option<PortBinding>) -> Result<Completion, ApiError> {
        let mut started = false;
        self.inner.state.send_if_modified(|state| {
            if matches!(state, OpState::Pending) {
                return false;
            }
            *state = OpState::Pending;
            started = true;
            true
        });
        if !started {
            return Err(ApiError::invalid_argument("overlapped object already has a pending operation"));
        }

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();
        Ok(Completion { overlapped: Some(self.clone()), port, cancel })
    }

    /// Signals the running operation to finish with [`ApiError::Aborted`].
    pub(crate) fn cancel_current(&self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.inner.cancel.lock().unwrap_or_else(PoisonError::into_inner).cancel();
        true
    }
}

impl Default for Overlapped {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Overlapped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.state.borrow() {
            OpState::Idle => "idle",
            OpState::Pending => "pending",
            OpState::Complete { result: Ok(_), .. } => "complete",
            OpState::Complete { result: Err(_), .. } => "failed",
        };
        f.debug_struct("Overlapped").field("state", &state).finish()
    }
}

/// One-shot completion of a pending [`Overlapped`].
///
/// Dropping it without completing finishes the operation with
/// [`ApiError::Aborted`], so an overlapped object never stays pending after
/// the work behind it is gone.
pub(crate) struct Completion {
    overlapped: Option<Overlapped>,
    port: Option<PortBinding>,
    cancel: CancellationToken,
}

impl Completion {
    pub(crate) fn is_for(&self, overlapped: &Overlapped) -> bool {
        self.overlapped.as_ref().is_some_and(|o| o.ptr_eq(overlapped))
    }

    /// Resolves when the caller cancels the operation.
    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub(crate) fn complete(mut self, result: Result<usize, ApiError>, data: Bytes) {
        self.finish(result, data);
    }

    fn finish(&mut self, result: Result<usize, ApiError>, data: Bytes) {
        let Some(overlapped) = self.overlapped.take() else {
            return;
        };

        let bytes = match &result {
            Ok(n) => *n,
            Err(_) => data.len(),
        };
        let status = duplicate(&result);
        trace!(bytes, ok = result.is_ok(), "operation completed");
        overlapped.inner.state.send_replace(OpState::Complete { result, data });

        if let Some(binding) = self.port.take() {
            binding.port.post(CompletionPacket { key: binding.key, bytes, status, overlapped });
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.finish(Err(ApiError::Aborted), Bytes::new());
    }
}

fn duplicate(result: &Result<usize, ApiError>) -> Result<usize, ApiError> {
    match result {
        Ok(n) => Ok(*n),
        Err(e) => Err(e.duplicate()),
    }
}
