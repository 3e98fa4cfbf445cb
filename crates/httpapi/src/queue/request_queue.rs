use crate::codec::{RecordEncoder, RequestRecord, record_size};
use crate::completion::{Completion, CompletionPort, Overlapped, PortBinding};
use crate::connection::ConnectionShared;
use crate::ensure;
use crate::protocol::record::ENTITY_CHUNK_DESC_SIZE;
use crate::protocol::{
    ApiError, ApiVersion, HttpResponse, REQUEST_FIXED_SIZE, ReceiveFlags, ReceivedRequest, RequestFlags, RequestId,
    SendFlags,
};
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::codec::Encoder;
use tracing::{debug, trace, warn};

/// Synchronous outcome of an overlapped call that was accepted.
///
/// Either way the [`Overlapped`] completes exactly once, and a packet is
/// posted when the queue is associated with a completion port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
    /// Finished before the call returned, with this many bytes.
    Complete(usize),
    /// Will finish later through the overlapped object.
    Pending,
}

/// Parsed requests waiting to be received, and the responses sent for them.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    version: ApiVersion,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    closed: bool,
    /// Requests never handed out, oldest first.
    unclaimed: VecDeque<RequestId>,
    /// Wildcard receives waiting for a request, in issue order.
    waiters: VecDeque<ReceiveWaiter>,
    /// Every request resolvable by id, handed out or not.
    parked: HashMap<RequestId, Parked>,
    port: Option<PortBinding>,
}

struct Parked {
    request: Arc<ReceivedRequest>,
    conn: Arc<ConnectionShared>,
    /// Handed out by a wildcard receive; only then is the id resolvable.
    claimed: bool,
    responding: bool,
}

struct ReceiveWaiter {
    flags: ReceiveFlags,
    capacity: usize,
    completion: Completion,
}

/// Result of copying a parked request into a buffer of some capacity.
enum Fill {
    /// Smaller than the fixed block; the request is not claimed.
    TooSmall(ApiError),
    /// The connection behind the request is gone.
    Gone,
    /// The request is now bound to its id; `result` may still be `MoreData`.
    Delivered { result: Result<usize, ApiError>, data: Bytes },
}

impl RequestQueue {
    pub(crate) fn new(version: ApiVersion) -> Self {
        Self { inner: Arc::new(QueueInner { version, state: Mutex::new(QueueState::default()) }) }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn version(&self) -> ApiVersion {
        self.inner.version
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn ptr_eq(&self, other: &RequestQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Posts completions of overlapped operations on this queue to `port`, tagged with `key`.
    pub fn associate(&self, port: &CompletionPort, key: u64) -> Result<(), ApiError> {
        let mut state = self.lock();
        ensure!(!state.closed, ApiError::InvalidHandle);
        ensure!(state.port.is_none(), ApiError::invalid_argument("queue is already associated with a completion port"));
        state.port = Some(PortBinding { port: port.clone(), key });
        Ok(())
    }

    /// Receives a request into `dest`, waiting for one when `id` is
    /// [`RequestId::NULL`] and nothing is queued.
    ///
    /// On [`ApiError::MoreData`] the fixed block has been written to `dest`
    /// and the request is bound to its id; retry by id with the reported size.
    pub async fn receive_request(&self, id: RequestId, flags: ReceiveFlags, dest: &mut [u8]) -> Result<usize, ApiError> {
        let overlapped = Overlapped::new();
        let status = self.receive_inner(id, flags, dest.len(), &overlapped, None);
        let result = match status {
            Ok(IoStatus::Complete(n)) => Ok(n),
            Ok(IoStatus::Pending) => {
                let guard = CancelOnDrop { queue: self, overlapped: &overlapped };
                let result = overlapped.wait().await;
                drop(guard);
                result
            }
            Err(e) => Err(e),
        };

        if let Some(data) = overlapped.data() {
            dest[..data.len()].copy_from_slice(&data);
        }
        result
    }

    /// Overlapped form of [`RequestQueue::receive_request`]. The record is
    /// available from [`Overlapped::data`] once the operation completes.
    pub fn receive_request_overlapped(
        &self,
        id: RequestId,
        flags: ReceiveFlags,
        capacity: usize,
        overlapped: &Overlapped,
    ) -> Result<IoStatus, ApiError> {
        let port = self.lock().port.clone();
        self.receive_inner(id, flags, capacity, overlapped, port)
    }

    fn receive_inner(
        &self,
        id: RequestId,
        flags: ReceiveFlags,
        capacity: usize,
        overlapped: &Overlapped,
        port: Option<PortBinding>,
    ) -> Result<IoStatus, ApiError> {
        let mut state = self.lock();
        ensure!(!state.closed, ApiError::InvalidHandle);
        ensure!(!overlapped.is_pending(), ApiError::invalid_argument("overlapped object already has a pending operation"));

        if !id.is_null() {
            let Some(parked) = state.parked.get(&id) else {
                return Err(ApiError::ConnectionInvalid);
            };
            ensure!(parked.claimed && !parked.responding, ApiError::ConnectionInvalid);

            return match fill(parked, flags, capacity) {
                Fill::TooSmall(e) => finish_now(overlapped, port, Err(e), Bytes::new()),
                Fill::Gone => {
                    state.parked.remove(&id);
                    state.unclaimed.retain(|queued| *queued != id);
                    Err(ApiError::ConnectionInvalid)
                }
                Fill::Delivered { result, data } => finish_now(overlapped, port, result, data),
            };
        }

        while let Some(&front) = state.unclaimed.front() {
            let Some(parked) = state.parked.get(&front) else {
                state.unclaimed.pop_front();
                continue;
            };

            match fill(parked, flags, capacity) {
                Fill::TooSmall(e) => return finish_now(overlapped, port, Err(e), Bytes::new()),
                Fill::Gone => {
                    state.unclaimed.pop_front();
                    state.parked.remove(&front);
                }
                Fill::Delivered { result, data } => {
                    state.unclaimed.pop_front();
                    state.claim(front);
                    trace!(request_id = %front, "request handed out");
                    return finish_now(overlapped, port, result, data);
                }
            }
        }

        let completion = overlapped.begin(port)?;
        state.waiters.push_back(ReceiveWaiter { flags, capacity, completion });
        trace!(waiters = state.waiters.len(), "receive pending");
        Ok(IoStatus::Pending)
    }

    /// Parks a freshly parsed request, handing it straight to the oldest
    /// pending receive if there is one.
    pub(crate) fn park(&self, request: Arc<ReceivedRequest>, conn: Arc<ConnectionShared>) -> Result<(), ApiError> {
        let mut state = self.lock();
        ensure!(!state.closed, ApiError::InvalidHandle);

        let id = request.request_id;
        debug!(conn_id = %conn.id(), request_id = %id, url = request.cooked_url.full(), "request queued");
        state.parked.insert(id, Parked { request, conn, claimed: false, responding: false });
        state.unclaimed.push_back(id);
        Self::serve_waiters(&mut state);
        Ok(())
    }

    fn serve_waiters(state: &mut QueueState) {
        while !state.waiters.is_empty() {
            let Some(&front) = state.unclaimed.front() else {
                return;
            };
            let Some(parked) = state.parked.get(&front) else {
                state.unclaimed.pop_front();
                continue;
            };
            let Some(waiter) = state.waiters.pop_front() else {
                return;
            };

            match fill(parked, waiter.flags, waiter.capacity) {
                Fill::TooSmall(e) => waiter.completion.complete(Err(e), Bytes::new()),
                Fill::Gone => {
                    state.unclaimed.pop_front();
                    state.parked.remove(&front);
                    state.waiters.push_front(waiter);
                }
                Fill::Delivered { result, data } => {
                    state.unclaimed.pop_front();
                    state.claim(front);
                    trace!(request_id = %front, "request handed to pending receive");
                    waiter.completion.complete(result, data);
                }
            }
        }
    }

    /// Drops a request whose connection went away.
    pub(crate) fn forget(&self, id: RequestId) {
        let mut state = self.lock();
        if state.parked.remove(&id).is_some() {
            state.unclaimed.retain(|queued| *queued != id);
            trace!(request_id = %id, "request forgotten");
        }
    }

    fn lookup(&self, id: RequestId) -> Result<(Arc<ConnectionShared>, Option<PortBinding>), ApiError> {
        let mut state = self.lock();
        ensure!(!state.closed, ApiError::InvalidHandle);
        let conn = state.resolve(id)?;
        Ok((conn, state.port.clone()))
    }

    /// Copies the next part of the request's entity body into `dest`,
    /// waiting for bytes when none are buffered.
    ///
    /// Returns [`ApiError::EndOfBody`] once the whole body has been handed out.
    pub async fn receive_entity_body(&self, id: RequestId, dest: &mut [u8]) -> Result<usize, ApiError> {
        ensure!(!dest.is_empty(), ApiError::invalid_argument("empty entity body buffer"));
        let (conn, _) = self.lookup(id)?;
        let bytes = conn.read_body(id, dest.len()).await?;
        dest[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Overlapped form of [`RequestQueue::receive_entity_body`]. The bytes are
    /// available from [`Overlapped::data`].
    pub fn receive_entity_body_overlapped(
        &self,
        id: RequestId,
        capacity: usize,
        overlapped: &Overlapped,
    ) -> Result<IoStatus, ApiError> {
        ensure!(capacity > 0, ApiError::invalid_argument("empty entity body buffer"));
        ensure!(!overlapped.is_pending(), ApiError::invalid_argument("overlapped object already has a pending operation"));
        let (conn, port) = self.lookup(id)?;

        match conn.try_take_body(id, capacity) {
            Ok(Some(bytes)) => finish_now(overlapped, port, Ok(bytes.len()), bytes),
            Ok(None) => {
                let completion = overlapped.begin(port)?;
                tokio::spawn(async move {
                    let outcome = tokio::select! {
                        read = conn.read_body(id, capacity) => read,
                        _ = completion.cancelled() => Err(ApiError::Aborted),
                    };
                    match outcome {
                        Ok(bytes) => completion.complete(Ok(bytes.len()), bytes),
                        Err(e) => completion.complete(Err(e), Bytes::new()),
                    }
                });
                Ok(IoStatus::Pending)
            }
            Err(ApiError::EndOfBody) => finish_now(overlapped, port, Err(ApiError::EndOfBody), Bytes::new()),
            Err(e) => Err(e),
        }
    }

    /// Writes the response for `id` and returns the bytes put on the wire.
    ///
    /// Afterwards the id is gone: receiving or responding again reports
    /// [`ApiError::ConnectionInvalid`].
    pub async fn send_response(&self, id: RequestId, flags: SendFlags, response: HttpResponse) -> Result<usize, ApiError> {
        let overlapped = Overlapped::new();
        self.send_inner(id, flags, response, &overlapped, None)?;
        overlapped.wait().await
    }

    /// Overlapped form of [`RequestQueue::send_response`].
    pub fn send_response_overlapped(
        &self,
        id: RequestId,
        flags: SendFlags,
        response: HttpResponse,
        overlapped: &Overlapped,
    ) -> Result<IoStatus, ApiError> {
        let port = self.lock().port.clone();
        self.send_inner(id, flags, response, overlapped, port)
    }

    fn send_inner(
        &self,
        id: RequestId,
        flags: SendFlags,
        response: HttpResponse,
        overlapped: &Overlapped,
        port: Option<PortBinding>,
    ) -> Result<IoStatus, ApiError> {
        let (conn, completion) = {
            let mut state = self.lock();
            ensure!(!state.closed, ApiError::InvalidHandle);
            let conn = state.resolve(id)?;
            let completion = overlapped.begin(port)?;
            if let Some(parked) = state.parked.get_mut(&id) {
                parked.responding = true;
            }
            (conn, completion)
        };

        let close = flags.contains(SendFlags::DISCONNECT) || response.closes_connection();
        let queue = self.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                written = conn.write_response(response) => written.map_err(ApiError::from),
                _ = completion.cancelled() => Err(ApiError::Aborted),
            };

            queue.lock().parked.remove(&id);
            match &outcome {
                Ok(written) => {
                    debug!(request_id = %id, written, close, "response written");
                    conn.response_sent(id, close);
                }
                Err(e) => {
                    warn!(request_id = %id, cause = %e, "failed to write response, closing connection");
                    conn.abort();
                }
            }
            completion.complete(outcome, Bytes::new());
        });
        Ok(IoStatus::Pending)
    }

    /// Cancels a pending overlapped operation; it completes with [`ApiError::Aborted`].
    pub fn cancel(&self, overlapped: &Overlapped) -> Result<(), ApiError> {
        let waiter = {
            let mut state = self.lock();
            ensure!(!state.closed, ApiError::InvalidHandle);
            let position = state.waiters.iter().position(|w| w.completion.is_for(overlapped));
            position.and_then(|p| state.waiters.remove(p))
        };

        if let Some(waiter) = waiter {
            waiter.completion.complete(Err(ApiError::Aborted), Bytes::new());
            return Ok(());
        }
        ensure!(overlapped.cancel_current(), ApiError::invalid_argument("no pending operation for this overlapped object"));
        Ok(())
    }

    /// Closes the queue: pending receives complete with [`ApiError::Aborted`],
    /// connections with parked requests are dropped, and any later call
    /// reports [`ApiError::InvalidHandle`].
    pub fn close(&self) -> Result<(), ApiError> {
        let (waiters, parked) = {
            let mut state = self.lock();
            ensure!(!state.closed, ApiError::InvalidHandle);
            state.closed = true;
            state.unclaimed.clear();
            state.port = None;
            (std::mem::take(&mut state.waiters), std::mem::take(&mut state.parked))
        };

        debug!(waiters = waiters.len(), requests = parked.len(), "request queue closed");
        for waiter in waiters {
            waiter.completion.complete(Err(ApiError::Aborted), Bytes::new());
        }
        for (_, parked) in parked {
            parked.conn.abort();
        }
        Ok(())
    }
}

impl RequestQueue {
    #[cfg(test)]
    pub(crate) fn parked_len(&self) -> usize {
        self.lock().parked.len()
    }
}

impl QueueState {
    fn claim(&mut self, id: RequestId) {
        if let Some(parked) = self.parked.get_mut(&id) {
            parked.claimed = true;
        }
    }

    /// The connection of a handed-out request that is not being answered yet.
    /// Requests whose connection went away are dropped here.
    fn resolve(&mut self, id: RequestId) -> Result<Arc<ConnectionShared>, ApiError> {
        let parked = match self.parked.get(&id) {
            Some(parked) if parked.claimed && !parked.responding => parked,
            _ => return Err(ApiError::ConnectionInvalid),
        };
        if parked.conn.is_closed() {
            self.parked.remove(&id);
            trace!(request_id = %id, "request dropped, its connection is gone");
            return Err(ApiError::ConnectionInvalid);
        }
        Ok(Arc::clone(&parked.conn))
    }
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("RequestQueue")
            .field("version", &self.inner.version)
            .field("closed", &state.closed)
            .field("unclaimed", &state.unclaimed.len())
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

fn finish_now(
    overlapped: &Overlapped,
    port: Option<PortBinding>,
    result: Result<usize, ApiError>,
    data: Bytes,
) -> Result<IoStatus, ApiError> {
    let status = match &result {
        Ok(n) => Ok(IoStatus::Complete(*n)),
        Err(e) => Err(e.duplicate()),
    };
    overlapped.begin(port)?.complete(result, data);
    status
}

fn fill(parked: &Parked, flags: ReceiveFlags, capacity: usize) -> Fill {
    if capacity < REQUEST_FIXED_SIZE {
        return Fill::TooSmall(ApiError::InsufficientBuffer { provided: capacity, required: REQUEST_FIXED_SIZE });
    }

    let request = &parked.request;
    let id = request.request_id;
    let Some((bytes_received, more)) = parked.conn.body_progress(id) else {
        return Fill::Gone;
    };

    let required = record_size(request);
    let mut dst = BytesMut::new();
    if capacity < required {
        let record = RequestRecord::fixed_only(request, body_flags(more), bytes_received);
        return match RecordEncoder.encode(record, &mut dst) {
            Ok(()) => Fill::Delivered { result: Err(ApiError::MoreData { required }), data: dst.freeze() },
            Err(e) => Fill::Delivered { result: Err(e), data: Bytes::new() },
        };
    }

    let entity = if flags.contains(ReceiveFlags::COPY_BODY) && capacity > required + ENTITY_CHUNK_DESC_SIZE {
        parked.conn.try_take_body(id, capacity - required - ENTITY_CHUNK_DESC_SIZE).ok().flatten()
    } else {
        None
    };
    let more = parked.conn.body_progress(id).is_some_and(|(_, more)| more);

    let record = RequestRecord::complete(request, body_flags(more), bytes_received, entity.as_deref());
    match RecordEncoder.encode(record, &mut dst) {
        Ok(()) => Fill::Delivered { result: Ok(dst.len()), data: dst.freeze() },
        Err(e) => Fill::Delivered { result: Err(e), data: Bytes::new() },
    }
}

fn body_flags(more: bool) -> RequestFlags {
    if more { RequestFlags::MORE_ENTITY_BODY_EXISTS } else { RequestFlags::NONE }
}

/// Cancels a pending receive when a blocking call is dropped before it completes.
struct CancelOnDrop<'a> {
    queue: &'a RequestQueue,
    overlapped: &'a Overlapped,
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.overlapped.is_pending() {
            let _ = self.queue.cancel(self.overlapped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::HeaderDecoder;
    use crate::protocol::{ConnectionId, RequestView};
    use std::net::SocketAddr;
    use tokio_util::codec::Decoder;

    fn park_one(queue: &RequestQueue) -> (RequestId, Arc<ConnectionShared>) {
        let remote: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let local: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        let mut bytes = BytesMut::from("GET /foobar HTTP/1.1\r\nHost: localhost:50000\r\n\r\n");
        let head = HeaderDecoder::default().decode(&mut bytes).unwrap().unwrap();
        let cooked_url = head.cooked_url(local).unwrap();

        let conn = Arc::new(ConnectionShared::new(ConnectionId::next(), Box::new(tokio::io::sink()), 128));
        let request = ReceivedRequest::new(head, cooked_url, conn.id(), 0, remote, local);
        let id = request.request_id;
        conn.begin_request(id, request.head_len, false);
        queue.park(Arc::new(request), Arc::clone(&conn)).unwrap();
        (id, conn)
    }

    #[tokio::test]
    async fn id_resolves_only_after_hand_out() {
        let queue = RequestQueue::new(ApiVersion::V1);
        let (id, _conn) = park_one(&queue);
        let mut buf = vec![0u8; 2048];

        assert!(matches!(
            queue.receive_request(id, ReceiveFlags::NONE, &mut buf).await,
            Err(ApiError::ConnectionInvalid)
        ));
        assert!(matches!(
            queue.send_response(id, SendFlags::NONE, HttpResponse::new(200)).await,
            Err(ApiError::ConnectionInvalid)
        ));
        assert!(matches!(queue.receive_entity_body(id, &mut buf).await, Err(ApiError::ConnectionInvalid)));

        let n = queue.receive_request(RequestId::NULL, ReceiveFlags::NONE, &mut buf).await.unwrap();
        assert_eq!(RequestView::new(&buf[..n]).unwrap().request_id(), id);
        assert_eq!(queue.receive_request(id, ReceiveFlags::NONE, &mut buf).await.unwrap(), n);
        assert!(queue.send_response(id, SendFlags::NONE, HttpResponse::new(200)).await.is_ok());
        assert_eq!(queue.parked_len(), 0);
    }

    #[tokio::test]
    async fn fixed_only_hand_out_claims_the_id() {
        let queue = RequestQueue::new(ApiVersion::V1);
        let (id, _conn) = park_one(&queue);
        let mut buf = vec![0u8; 2048];

        let required = match queue.receive_request(RequestId::NULL, ReceiveFlags::NONE, &mut buf[..REQUEST_FIXED_SIZE]).await {
            Err(ApiError::MoreData { required }) => required,
            other => panic!("expect more data, got {other:?}"),
        };
        assert_eq!(queue.receive_request(id, ReceiveFlags::NONE, &mut buf[..required]).await.unwrap(), required);
    }

    #[tokio::test]
    async fn requests_of_dead_connections_are_dropped() {
        let queue = RequestQueue::new(ApiVersion::V1);
        let mut buf = vec![0u8; 2048];

        for _ in 0..100 {
            let (id, conn) = park_one(&queue);
            queue.receive_request(RequestId::NULL, ReceiveFlags::NONE, &mut buf).await.unwrap();
            conn.abort();
            assert!(matches!(
                queue.send_response(id, SendFlags::NONE, HttpResponse::new(200)).await,
                Err(ApiError::ConnectionInvalid)
            ));
        }
        assert_eq!(queue.parked_len(), 0);

        let (id, conn) = park_one(&queue);
        queue.receive_request(RequestId::NULL, ReceiveFlags::NONE, &mut buf).await.unwrap();
        conn.abort();
        assert!(matches!(queue.receive_entity_body(id, &mut buf).await, Err(ApiError::ConnectionInvalid)));
        assert_eq!(queue.parked_len(), 0);
    }
}
