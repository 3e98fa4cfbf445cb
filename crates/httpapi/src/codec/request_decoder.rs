//! Streaming request decoder.
//!
//! Alternates between two phases on one connection's byte stream:
//! 1. the request head, through [`HeaderDecoder`]
//! 2. the entity body, through a [`PayloadDecoder`] chosen from the head's framing
//!
//! Every request, bodiless or not, ends its payload phase with
//! [`PayloadItem::Eof`] before the next head is decoded.
//!
//! ```no_run
//! use micro_httpapi::codec::RequestDecoder;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! let head = decoder.decode(&mut buffer);
//! ```

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, RequestHead};
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// The decoder is in the head phase while `payload_decoder` is `None`.
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_limits(max_headers: usize, max_header_bytes: usize) -> Self {
        Self { header_decoder: HeaderDecoder::new(max_headers, max_header_bytes), payload_decoder: None }
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder::default(), payload_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<RequestHead>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some(head) => {
                self.payload_decoder = Some(head.payload_size().into());
                Some(Message::Header(head))
            }
            None => None,
        };

        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Verb;

    #[test]
    fn pipelined_requests() {
        let mut buf = BytesMut::from(
            "POST /a HTTP/1.1\r\nHost: h\r\nContent-Length: 4\r\n\r\npingGET /b HTTP/1.1\r\nHost: h\r\n\r\n",
        );
        let mut decoder = RequestDecoder::new();

        let Some(Message::Header(first)) = decoder.decode(&mut buf).unwrap() else { panic!("expect head") };
        assert_eq!(first.verb(), Verb::Post);
        assert_eq!(decoder.decode(&mut buf).unwrap().and_then(Message::into_payload_item), Some(PayloadItem::Chunk("ping".into())));
        assert_eq!(decoder.decode(&mut buf).unwrap().and_then(Message::into_payload_item), Some(PayloadItem::Eof));

        let Some(Message::Header(second)) = decoder.decode(&mut buf).unwrap() else { panic!("expect head") };
        assert_eq!(second.raw_url(), "/b");
        assert_eq!(decoder.decode(&mut buf).unwrap().and_then(Message::into_payload_item), Some(PayloadItem::Eof));
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn bad_request_line_is_an_error() {
        let mut buf = BytesMut::from("foo\r\n");
        assert!(RequestDecoder::new().decode(&mut buf).is_err());
    }
}
