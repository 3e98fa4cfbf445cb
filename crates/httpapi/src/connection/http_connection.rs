use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, trace, warn};

use crate::codec::RequestDecoder;
use crate::connection::shared::ConnectionShared;
use crate::engine::EngineConfig;
use crate::handler::Dispatch;
use crate::protocol::{
    ConnectionId, HttpError, HttpResponse, Message, ParseError, PayloadItem, ReceivedRequest, RequestHead,
    RequestHeaderId, RequestId,
};
use crate::queue::RequestQueue;

/// One accepted connection: parses requests off the read half, parks each
/// in the queue its URL routes to, and waits until the queue has written the
/// response before reading the next request.
///
/// While a request is parked the connection keeps feeding its entity body to
/// the shared state, up to the configured buffer cap, so that body receives
/// on the queue make progress without the connection task blocking on them.
pub struct HttpConnection<R> {
    framed_read: FramedRead<R, RequestDecoder>,
    shared: Arc<ConnectionShared>,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    body_buffer_cap: usize,
    linger: Duration,
    parked: Option<(RequestQueue, RequestId)>,
}

/// What to do once the current request is finished.
enum Next {
    KeepAlive,
    Close,
}

impl<R> HttpConnection<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new<W>(reader: R, writer: W, remote_addr: SocketAddr, local_addr: SocketAddr, config: &EngineConfig) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let decoder = RequestDecoder::with_limits(config.max_headers(), config.max_header_bytes());
        let shared = ConnectionShared::new(ConnectionId::next(), Box::new(writer), config.write_buffer_capacity());
        Self {
            framed_read: FramedRead::with_capacity(reader, decoder, config.read_buffer_capacity()),
            shared: Arc::new(shared),
            remote_addr,
            local_addr,
            body_buffer_cap: config.body_buffer_cap(),
            linger: config.linger(),
            parked: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id()
    }

    pub async fn process<D>(mut self, dispatch: Arc<D>) -> Result<(), HttpError>
    where
        D: Dispatch + ?Sized,
    {
        debug!(conn_id = %self.shared.id(), remote = %self.remote_addr, local = %self.local_addr, "connection accepted");
        let result = self.serve(&*dispatch).await;

        if let Some((queue, id)) = self.parked.take() {
            queue.forget(id);
        }
        self.shared.abort();
        result
    }

    async fn serve<D>(&mut self, dispatch: &D) -> Result<(), HttpError>
    where
        D: Dispatch + ?Sized,
    {
        loop {
            let message = tokio::select! {
                message = self.framed_read.next() => message,
                () = self.shared.aborted() => {
                    info!(conn_id = %self.shared.id(), "connection dropped by its queue");
                    return Ok(());
                }
            };

            match message {
                Some(Ok(Message::Header(head))) => {
                    if let Next::Close = self.serve_request(head, dispatch).await? {
                        return Ok(());
                    }
                }

                Some(Ok(Message::Payload(_))) => {
                    error!(conn_id = %self.shared.id(), "entity body without a request head");
                    return Err(ParseError::invalid_body("entity body without a request head").into());
                }

                Some(Err(e @ ParseError::Io { .. })) => return Err(e.into()),

                Some(Err(e)) => {
                    self.reject(&e).await;
                    return Err(e.into());
                }

                None => {
                    info!(conn_id = %self.shared.id(), "cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }

    async fn serve_request<D>(&mut self, head: RequestHead, dispatch: &D) -> Result<Next, HttpError>
    where
        D: Dispatch + ?Sized,
    {
        let keep_alive = head.keep_alive();
        let cooked_url = match head.cooked_url(self.local_addr) {
            Ok(cooked_url) => cooked_url,
            Err(e) => {
                self.reject(&e).await;
                return Err(e.into());
            }
        };

        let Some(route) = dispatch.route(&cooked_url, self.local_addr) else {
            info!(conn_id = %self.shared.id(), url = cooked_url.full(), "no registered prefix matches, respond 404");
            self.shared.write_response(HttpResponse::not_found()).await?;
            self.close_write().await;
            return Ok(Next::Close);
        };

        let expect_continue = head.headers().has_token(RequestHeaderId::Expect, "100-continue");
        let request = ReceivedRequest::new(
            head,
            cooked_url,
            self.shared.id(),
            route.context,
            self.remote_addr,
            self.local_addr,
        );
        let id = request.request_id;
        let has_body = request.has_body();
        self.shared.begin_request(id, request.head_len, has_body);

        if let Err(e) = route.queue.park(Arc::new(request), Arc::clone(&self.shared)) {
            warn!(conn_id = %self.shared.id(), cause = %e, "request queue is closed, respond 503");
            self.shared.write_response(HttpResponse::service_unavailable()).await?;
            self.close_write().await;
            return Ok(Next::Close);
        }
        self.parked = Some((route.queue, id));

        if expect_continue && has_body {
            self.shared.write_continue().await?;
            trace!(conn_id = %self.shared.id(), request_id = %id, "sent 100 continue");
        }

        // on close the request stays recorded so that `process` drops it from its queue
        let next = self.pump_body(id, keep_alive).await?;
        if let Next::KeepAlive = next {
            self.parked = None;
        }
        Ok(next)
    }

    /// Feeds entity body bytes to the parked request until its response has
    /// been sent, then skips whatever body the consumer did not read.
    async fn pump_body(&mut self, id: RequestId, keep_alive: bool) -> Result<Next, HttpError> {
        let shared = Arc::clone(&self.shared);
        let response_sent = shared.wait_response_sent(id);
        tokio::pin!(response_sent);

        let mut body_open = true;
        let close = loop {
            tokio::select! {
                // the response decides the connection's fate, later body bytes are only skipped
                biased;
                sent = &mut response_sent => match sent {
                    Some(close) => break close,
                    None => {
                        debug!(conn_id = %shared.id(), request_id = %id, "connection aborted while request was parked");
                        return Ok(Next::Close);
                    }
                },
                item = self.next_body_item(), if body_open => match item? {
                    Some(PayloadItem::Chunk(bytes)) => shared.push_body(&bytes),
                    Some(PayloadItem::Eof) => {
                        shared.finish_body();
                        body_open = false;
                    }
                    None => {
                        info!(conn_id = %shared.id(), request_id = %id, "peer closed in the middle of an entity body");
                        return Ok(Next::Close);
                    }
                },
            }
        };

        if close || !keep_alive {
            self.close_write().await;
            return Ok(Next::Close);
        }

        while body_open {
            match self.next_body_item().await? {
                Some(PayloadItem::Chunk(bytes)) => trace!(conn_id = %shared.id(), len = bytes.len(), "skip unread body"),
                Some(PayloadItem::Eof) => body_open = false,
                None => return Ok(Next::Close),
            }
        }
        Ok(Next::KeepAlive)
    }

    async fn next_body_item(&mut self) -> Result<Option<PayloadItem>, ParseError> {
        self.shared.wait_body_room(self.body_buffer_cap).await;
        match self.framed_read.next().await {
            Some(Ok(Message::Payload(item))) => Ok(Some(item)),
            Some(Ok(Message::Header(_))) => Err(ParseError::invalid_body("request head inside an entity body")),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    /// Answers a malformed request with 400 and `Connection: close`, then
    /// discards input until the peer closes or the linger timeout expires.
    async fn reject(&mut self, e: &ParseError) {
        warn!(conn_id = %self.shared.id(), cause = %e, "can't parse request, respond 400");
        if let Err(e) = self.shared.write_response(HttpResponse::bad_request()).await {
            error!(conn_id = %self.shared.id(), cause = %e, "failed to send 400 response");
            return;
        }
        self.close_write().await;

        let reader = self.framed_read.get_mut();
        let mut discard = [0u8; 1024];
        let drained = tokio::time::timeout(self.linger, async {
            loop {
                match reader.read(&mut discard).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => trace!(len = n, "discard bytes after bad request"),
                }
            }
        })
        .await;
        if drained.is_err() {
            debug!(conn_id = %self.shared.id(), "peer kept the connection open past linger, dropping it");
        }
    }

    async fn close_write(&self) {
        if let Err(e) = self.shared.shutdown_write().await {
            debug!(conn_id = %self.shared.id(), cause = %e, "failed to shut down write half");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{Route, make_dispatch};
    use crate::protocol::{ApiVersion, ReceiveFlags, RequestView, SendFlags};
    use indoc::indoc;
    use tokio::io::{AsyncWriteExt, duplex};

    fn addrs() -> (SocketAddr, SocketAddr) {
        ("127.0.0.1:40000".parse().unwrap(), "127.0.0.1:50000".parse().unwrap())
    }

    async fn read_all(reader: &mut (impl AsyncRead + Unpin)) -> String {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn bad_request_line_gets_400_and_close() {
        let (client, server) = duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (remote, local) = addrs();
        let config = EngineConfig::builder().linger(Duration::from_millis(100)).build();
        let connection = HttpConnection::new(server_read, server_write, remote, local, &config);
        let task = tokio::spawn(connection.process(Arc::new(make_dispatch(|_, _| None))));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"foo\r\n\r\n").await.unwrap();

        let response = read_all(&mut client_read).await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.contains("\r\nConnection: close\r\n"));

        drop(client_write);
        assert!(task.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn unrouted_request_gets_404() {
        let (client, server) = duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (remote, local) = addrs();
        let connection = HttpConnection::new(server_read, server_write, remote, local, &EngineConfig::default());
        let task = tokio::spawn(connection.process(Arc::new(make_dispatch(|_, _| None))));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"GET /nowhere HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();

        let response = read_all(&mut client_read).await;
        assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn parks_request_and_writes_response() {
        let queue = RequestQueue::new(ApiVersion::V2);
        let dispatch = {
            let queue = queue.clone();
            make_dispatch(move |_, _| Some(Route { queue: queue.clone(), context: 0xdead_beef }))
        };

        let (client, server) = duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (remote, local) = addrs();
        let connection = HttpConnection::new(server_read, server_write, remote, local, &EngineConfig::default());
        let task = tokio::spawn(connection.process(Arc::new(dispatch)));

        let (mut client_read, mut client_write) = tokio::io::split(client);
        let request = indoc! {"
            POST /upload?x=1 HTTP/1.1\r
            Host: localhost:50000\r
            Connection: close\r
            Content-Length: 4\r
            \r
            ping"};
        client_write.write_all(request.as_bytes()).await.unwrap();

        let mut buf = vec![0u8; 4096];
        let n = queue.receive_request(RequestId::NULL, ReceiveFlags::NONE, &mut buf).await.unwrap();
        let view = RequestView::new(&buf[..n]).unwrap();
        assert_eq!(view.url_context(), 0xdead_beef);
        assert_eq!(view.query(), Some("?x=1"));

        let mut body = [0u8; 16];
        let read = queue.receive_entity_body(view.request_id(), &mut body).await.unwrap();
        assert_eq!(&body[..read], b"ping");

        let response = HttpResponse::new(200).with_header(crate::protocol::ResponseHeaderId::ContentLength, "2").with_chunk("ok");
        queue.send_response(view.request_id(), SendFlags::NONE, response).await.unwrap();

        let text = read_all(&mut client_read).await;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("\r\n\r\nok"));
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn peer_close_mid_body_drops_parked_request() {
        let queue = RequestQueue::new(ApiVersion::V1);
        let dispatch = {
            let queue = queue.clone();
            make_dispatch(move |_, _| Some(Route { queue: queue.clone(), context: 0 }))
        };

        let (client, server) = duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (remote, local) = addrs();
        let connection = HttpConnection::new(server_read, server_write, remote, local, &EngineConfig::default());
        let task = tokio::spawn(connection.process(Arc::new(dispatch)));

        let (client_read, mut client_write) = tokio::io::split(client);
        client_write
            .write_all(b"POST /upload HTTP/1.1\r\nHost: localhost:50000\r\nContent-Length: 10\r\n\r\nping")
            .await
            .unwrap();

        let mut buf = vec![0u8; 4096];
        let n = queue.receive_request(RequestId::NULL, ReceiveFlags::NONE, &mut buf).await.unwrap();
        let id = RequestView::new(&buf[..n]).unwrap().request_id();
        drop(client_read);
        drop(client_write);

        assert!(task.await.unwrap().is_ok());
        assert_eq!(queue.parked_len(), 0);
        assert!(matches!(
            queue.send_response(id, SendFlags::NONE, HttpResponse::new(200)).await,
            Err(crate::protocol::ApiError::ConnectionInvalid)
        ));
    }
}
