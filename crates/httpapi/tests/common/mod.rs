#![allow(dead_code, reason = "each test binary uses a different subset")]

use micro_httpapi::protocol::{HttpResponse, RequestId, SendFlags};
use micro_httpapi::queue::RequestQueue;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}

pub fn simple_req(port: u16) -> String {
    format!("GET /foobar HTTP/1.1\r\nHost: localhost:{port}\r\nConnection: keep-alive\r\nUser-Agent: WINE\r\n\r\n")
}

pub async fn connect(port: u16) -> TcpStream {
    TcpStream::connect(("127.0.0.1", port)).await.unwrap()
}

pub async fn send(stream: &mut TcpStream, bytes: impl AsRef<[u8]>) {
    stream.write_all(bytes.as_ref()).await.unwrap();
}

/// Reads whatever the server has written so far, waiting up to a second for the first byte.
pub async fn recv(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = vec![0u8; 8192];
    let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf)).await.unwrap().unwrap();
    buf.truncate(n);
    buf
}

pub async fn recv_text(stream: &mut TcpStream) -> String {
    String::from_utf8(recv(stream).await).unwrap()
}

pub fn teapot() -> HttpResponse {
    HttpResponse::new(418).with_reason("I'm a teapot")
}

/// Answers a request with an empty 418 and consumes the response on the client side.
pub async fn send_teapot(queue: &RequestQueue, id: RequestId, stream: &mut TcpStream) {
    queue.send_response(id, SendFlags::NONE, teapot()).await.unwrap();
    assert!(!recv(stream).await.is_empty());
}
