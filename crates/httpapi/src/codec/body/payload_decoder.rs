//! Picks the body framing declared by a request head.

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{ParseError, PayloadItem, PayloadSize};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Body decoder for one request, built from its [`PayloadSize`].
///
/// A request without a body yields `Eof` straight away, so every head is
/// followed by exactly one `Eof` on the message stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadDecoder {
    Length(LengthDecoder),
    Chunked(ChunkedDecoder),
    Empty,
}

impl From<PayloadSize> for PayloadDecoder {
    fn from(payload_size: PayloadSize) -> Self {
        match payload_size {
            PayloadSize::Length(0) | PayloadSize::Empty => Self::Empty,
            PayloadSize::Length(size) => Self::Length(LengthDecoder::new(size)),
            PayloadSize::Chunked => Self::Chunked(ChunkedDecoder::new()),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self {
            Self::Length(decoder) => decoder.decode(src),
            Self::Chunked(decoder) => decoder.decode(src),
            Self::Empty => Ok(Some(PayloadItem::Eof)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_is_empty() {
        assert_eq!(PayloadDecoder::from(PayloadSize::Length(0)), PayloadDecoder::Empty);
        let mut buf = BytesMut::from("GET / HTTP/1.1\r\n");
        assert_eq!(PayloadDecoder::Empty.decode(&mut buf).unwrap(), Some(PayloadItem::Eof));
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn chunked_body() {
        let mut decoder = PayloadDecoder::from(PayloadSize::Chunked);
        let mut buf = BytesMut::from("4\r\nping\r\n0\r\n\r\n");
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(PayloadItem::Chunk("ping".into())));
        assert_eq!(decoder.decode(&mut buf).unwrap(), Some(PayloadItem::Eof));
    }
}
