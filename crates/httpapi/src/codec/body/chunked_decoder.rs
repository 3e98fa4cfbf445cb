//! Decoder for `Transfer-Encoding: chunked` request bodies.
//!
//! Chunk-size lines (with optional extensions) are parsed by
//! `httparse::parse_chunk_size`; trailer fields after the last chunk are
//! skipped.

use crate::protocol::{ParseError, PayloadItem};
use bytes::{Buf, BytesMut};
use httparse::Status;
use std::cmp;
use tokio_util::codec::Decoder;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Reading a chunk-size line
    Size,
    /// Inside chunk data, bytes remaining
    Data(u64),
    /// CRLF after chunk data
    DataEnd,
    /// Trailer fields after the zero-size chunk
    Trailer,
    End,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: ChunkedState::Size }
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                ChunkedState::End => {
                    trace!("finished reading chunked data");
                    return Ok(Some(PayloadItem::Eof));
                }

                ChunkedState::Size => match httparse::parse_chunk_size(src) {
                    Ok(Status::Complete((consumed, size))) => {
                        src.advance(consumed);
                        self.state = if size == 0 { ChunkedState::Trailer } else { ChunkedState::Data(size) };
                    }
                    Ok(Status::Partial) => return Ok(None),
                    Err(_) => return Err(ParseError::invalid_body("invalid chunk size line")),
                },

                ChunkedState::Data(remaining) => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let len = cmp::min(remaining, src.len() as u64) as usize;
                    let bytes = src.split_to(len).freeze();
                    let remaining = remaining - len as u64;
                    self.state = if remaining == 0 { ChunkedState::DataEnd } else { ChunkedState::Data(remaining) };
                    trace!(len, "read chunked bytes");
                    return Ok(Some(PayloadItem::Chunk(bytes)));
                }

                ChunkedState::DataEnd => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    if &src[..2] != b"\r\n" {
                        return Err(ParseError::invalid_body("missing CRLF after chunk data"));
                    }
                    src.advance(2);
                    self.state = ChunkedState::Size;
                }

                ChunkedState::Trailer => {
                    let Some(line_end) = src.windows(2).position(|w| w == b"\r\n") else {
                        return Ok(None);
                    };
                    src.advance(line_end + 2);
                    if line_end == 0 {
                        self.state = ChunkedState::End;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(decoder: &mut ChunkedDecoder, src: &mut BytesMut) -> (Vec<u8>, bool) {
        let mut body = Vec::new();
        while let Some(item) = decoder.decode(src).unwrap() {
            match item {
                PayloadItem::Chunk(bytes) => body.extend_from_slice(&bytes),
                PayloadItem::Eof => return (body, true),
            }
        }
        (body, false)
    }

    #[test]
    fn test_basic() {
        let mut buffer = BytesMut::from(&b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\nGET"[..]);
        let mut decoder = ChunkedDecoder::new();

        let (body, eof) = collect(&mut decoder, &mut buffer);

        assert!(eof);
        assert_eq!(&body[..], b"hello world");
        assert_eq!(&buffer[..], b"GET");
    }

    #[test]
    fn test_chunks_with_extensions_and_trailers() {
        let mut buffer = BytesMut::from(&b"4;name=value\r\nWiki\r\n0\r\nExpires: never\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let (body, eof) = collect(&mut decoder, &mut buffer);

        assert!(eof);
        assert_eq!(&body[..], b"Wiki");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_incomplete_chunk() {
        let mut decoder = ChunkedDecoder::new();
        let mut buffer = BytesMut::from(&b"a\r\nhel"[..]);

        let (body, eof) = collect(&mut decoder, &mut buffer);
        assert!(!eof);
        assert_eq!(&body[..], b"hel");

        buffer.extend_from_slice(b"lo worl\r\n0\r\n\r\n");
        let (body, eof) = collect(&mut decoder, &mut buffer);
        assert!(eof);
        assert_eq!(&body[..], b"lo worl");
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut buffer = BytesMut::from(&b"xyz\r\nhello\r\n"[..]);
        assert!(ChunkedDecoder::new().decode(&mut buffer).is_err());
    }

    #[test]
    fn test_missing_crlf() {
        let mut buffer = BytesMut::from(&b"5\r\nhelloXX0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut buffer).unwrap().is_some());
        assert!(decoder.decode(&mut buffer).is_err());
    }
}
