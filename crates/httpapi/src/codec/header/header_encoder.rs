//! Serializes the status line and header block of an [`HttpResponse`].
//!
//! Known headers are written in enumeration order, unknown headers after them
//! in insertion order. A `Date` header is generated when the response does
//! not carry one. Nothing else is added or corrected, in particular
//! `Content-Length` is written only if the caller set it.

use crate::ensure;
use crate::protocol::{HeaderId, HttpResponse, ResponseHeaderId, SendError};

use bytes::{BufMut, BytesMut};
use std::io;
use std::io::Write;
use std::time::SystemTime;
use tokio_util::codec::Encoder;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl Encoder<&HttpResponse> for HeaderEncoder {
    type Error = SendError;

    fn encode(&mut self, response: &HttpResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        validate(response)?;

        dst.reserve(INIT_HEADER_SIZE);
        write!(FastWrite(dst), "{} {:03} {}\r\n", response.version(), response.status(), response.reason())?;

        let headers = response.headers();
        for &id in ResponseHeaderId::ALL {
            match headers.get(id) {
                Some(value) => put_header(dst, id.name().as_bytes(), value),
                None if id == ResponseHeaderId::Date => {
                    put_header(dst, id.name().as_bytes(), httpdate::fmt_http_date(SystemTime::now()).as_bytes())
                }
                None => {}
            }
        }

        for header in headers.unknown() {
            put_header(dst, &header.name, &header.value);
        }

        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[inline]
fn put_header(dst: &mut BytesMut, name: &[u8], value: &[u8]) {
    dst.put_slice(name);
    dst.put_slice(b": ");
    dst.put_slice(value);
    dst.put_slice(b"\r\n");
}

fn validate(response: &HttpResponse) -> Result<(), SendError> {
    ensure!(
        (100..=999).contains(&response.status()),
        SendError::invalid_response(format!("status code {} out of range", response.status()))
    );
    ensure!(!has_line_break(response.reason().as_bytes()), SendError::invalid_response("line break in reason phrase"));

    let headers = response.headers();
    for (id, value) in headers.known() {
        ensure!(!has_line_break(value), SendError::invalid_response(format!("line break in {} value", id.name())));
    }
    for header in headers.unknown() {
        ensure!(is_token(&header.name), SendError::invalid_response("invalid unknown header name"));
        ensure!(!has_line_break(&header.value), SendError::invalid_response("line break in unknown header value"));
    }
    Ok(())
}

fn has_line_break(bytes: &[u8]) -> bool {
    bytes.iter().any(|b| *b == b'\r' || *b == b'\n')
}

fn is_token(name: &[u8]) -> bool {
    !name.is_empty() && name.iter().all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(b))
}

/// Fast writer implementation for writing to BytesMut.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(response: &HttpResponse) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode(response, &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn teapot_with_generated_date() {
        let response =
            HttpResponse::new(418).with_reason("I'm a teapot").with_header(ResponseHeaderId::RetryAfter, "120");

        let text = encode(&response);

        assert!(text.starts_with("HTTP/1.1 418 I'm a teapot\r\n"));
        assert!(text.contains("\r\nRetry-After: 120\r\n"));
        assert!(text.contains("\r\nDate: "));
        assert!(!text.contains("Content-Length"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn caller_date_is_kept_verbatim() {
        let response = HttpResponse::new(200).with_header(ResponseHeaderId::Date, "yesteryear");

        let text = encode(&response);

        assert!(text.contains("\r\nDate: yesteryear\r\n"));
        assert_eq!(text.matches("Date:").count(), 1);
    }

    #[test]
    fn known_before_unknown_in_order() {
        let response = HttpResponse::new(200)
            .with_unknown_header("X-First", "1")
            .with_header(ResponseHeaderId::Server, "micro")
            .with_header(ResponseHeaderId::ContentLength, "0")
            .with_unknown_header("X-Second", "2");

        let text = encode(&response);

        let content_length = text.find("Content-Length: 0").unwrap();
        let server = text.find("Server: micro").unwrap();
        let first = text.find("X-First: 1").unwrap();
        let second = text.find("X-Second: 2").unwrap();
        assert!(content_length < server);
        assert!(server < first);
        assert!(first < second);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[test]
    fn rejects_header_injection() {
        let mut dst = BytesMut::new();
        let response = HttpResponse::new(200).with_unknown_header("X-Bad", "a\r\nb");
        assert!(HeaderEncoder.encode(&response, &mut dst).is_err());

        let response = HttpResponse::new(200).with_unknown_header("Bad Name", "a");
        assert!(HeaderEncoder.encode(&response, &mut dst).is_err());

        let response = HttpResponse::new(42);
        assert!(HeaderEncoder.encode(&response, &mut dst).is_err());
    }
}
