//! Listening sockets for registered ports.
//!
//! The first prefix registered on a port binds every address its host
//! resolves to. Later prefixes on the same port bind only addresses not
//! bound yet. A port stops listening once no registration uses it.

use crate::connection::HttpConnection;
use crate::engine::EngineConfig;
use crate::protocol::{ApiError, UrlPrefix};
use crate::routing::RoutingTable;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, lookup_host};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug)]
struct BoundSocket {
    addr: SocketAddr,
    accept: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub(crate) struct Listeners {
    ports: Mutex<HashMap<u16, Vec<BoundSocket>>>,
}

impl Listeners {
    /// Makes sure the addresses of `prefix` accept connections.
    pub(crate) async fn listen(
        &self,
        prefix: &UrlPrefix,
        routing: &Arc<RoutingTable>,
        config: &Arc<EngineConfig>,
    ) -> Result<(), ApiError> {
        let port = prefix.port();
        let host = prefix.host().trim_start_matches('[').trim_end_matches(']');
        let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();

        let mut ports = self.ports.lock().await;
        let bound = ports.entry(port).or_default();
        let mut listening = false;
        let mut last_error = None;

        for addr in addrs {
            if bound.iter().any(|socket| socket.addr == addr) {
                listening = true;
                continue;
            }
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    info!(%addr, "start listening");
                    let accept = tokio::spawn(accept_loop(listener, Arc::clone(routing), Arc::clone(config)));
                    bound.push(BoundSocket { addr, accept });
                    listening = true;
                }
                Err(e) => {
                    warn!(%addr, cause = %e, "bind server error");
                    last_error = Some(e);
                }
            }
        }

        if listening {
            return Ok(());
        }
        if bound.is_empty() {
            ports.remove(&port);
        }
        match last_error {
            Some(e) => Err(e.into()),
            None => Err(ApiError::invalid_argument(format!("{} resolves to no address", prefix.host()))),
        }
    }

    /// Stops accepting on `port` unless a registration still uses it.
    /// Connections already accepted keep running.
    ///
    /// The check runs under the port lock, so a concurrent [`Listeners::listen`]
    /// for the same port either keeps the sockets alive or binds them again.
    pub(crate) async fn release_unused(&self, port: u16, routing: &RoutingTable) {
        let mut ports = self.ports.lock().await;
        if routing.uses_port(port) {
            return;
        }
        if let Some(sockets) = ports.remove(&port) {
            stop(sockets).await;
            info!(port, "stop listening");
        }
    }

    pub(crate) async fn release_all(&self) {
        let ports = std::mem::take(&mut *self.ports.lock().await);
        for (port, sockets) in ports {
            stop(sockets).await;
            info!(port, "stop listening");
        }
    }
}

async fn stop(sockets: Vec<BoundSocket>) {
    for socket in sockets {
        socket.accept.abort();
        // the listener is closed once the aborted task is gone
        let _ = socket.accept.await;
    }
}

async fn accept_loop(listener: TcpListener, routing: Arc<RoutingTable>, config: Arc<EngineConfig>) {
    loop {
        let (tcp_stream, remote_addr) = match listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };
        let local_addr = match tcp_stream.local_addr() {
            Ok(local_addr) => local_addr,
            Err(e) => {
                warn!(cause = %e, "accepted socket has no local address");
                continue;
            }
        };

        let (reader, writer) = tcp_stream.into_split();
        let connection = HttpConnection::new(reader, writer, remote_addr, local_addr, &config);
        let routing = Arc::clone(&routing);

        tokio::spawn(async move {
            let conn_id = connection.id();
            match connection.process(routing).await {
                Ok(()) => {
                    info!(%conn_id, "finished process, connection shutdown");
                }
                Err(e) => {
                    error!(%conn_id, "service has error, cause {}, connection shutdown", e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ApiVersion;
    use crate::queue::RequestQueue;
    use crate::routing::Owner;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn port_in_use_survives_release() {
        let port = 50130;
        let listeners = Listeners::default();
        let routing = Arc::new(RoutingTable::new());
        let config = Arc::new(EngineConfig::default());
        let queue = RequestQueue::new(ApiVersion::V1);

        let first = UrlPrefix::parse(&format!("http://127.0.0.1:{port}/a/")).unwrap();
        let second = UrlPrefix::parse(&format!("http://127.0.0.1:{port}/b/")).unwrap();
        routing.add(first.clone(), Owner::Queue(queue.clone()), 0).unwrap();
        listeners.listen(&first, &routing, &config).await.unwrap();

        // a second registration lands on the port before the first one goes away
        routing.add(second.clone(), Owner::Queue(queue.clone()), 0).unwrap();
        routing.remove(&first, &Owner::Queue(queue.clone())).unwrap();
        listeners.release_unused(port, &routing).await;
        listeners.listen(&second, &routing, &config).await.unwrap();
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_ok());

        routing.remove(&second, &Owner::Queue(queue.clone())).unwrap();
        listeners.release_unused(port, &routing).await;
        assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
    }
}
