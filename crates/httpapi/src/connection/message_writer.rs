use crate::codec::HeaderEncoder;
use crate::protocol::{DataChunk, HttpResponse, SendError};
use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;

/// Writes whole responses onto the write half of a connection.
#[derive(Debug)]
pub struct MessageWriter<W> {
    writer: W,
    buffer: BytesMut,
    encoder: HeaderEncoder,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn with_capacity(writer: W, buffer_size: usize) -> Self {
        Self { writer, buffer: BytesMut::with_capacity(buffer_size), encoder: HeaderEncoder }
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Writes the head and every chunk in order, returning the total bytes put on the wire.
    ///
    /// In-memory chunks are coalesced with the head before the first write.
    /// Streamed chunks are copied to their end.
    pub async fn write_response(&mut self, response: HttpResponse) -> Result<usize, SendError> {
        self.buffer.clear();
        self.encoder.encode(&response, &mut self.buffer)?;

        let mut written = 0;
        for chunk in response.into_chunks() {
            match chunk {
                DataChunk::FromMemory(bytes) => self.buffer.extend_from_slice(&bytes),
                DataChunk::FromStream(mut reader) => {
                    written += self.flush_buffer().await?;
                    let copied = tokio::io::copy(&mut reader, &mut self.writer).await.map_err(SendError::io)?;
                    written += copied as usize;
                }
            }
        }
        written += self.flush_buffer().await?;
        self.writer.flush().await?;
        Ok(written)
    }

    async fn flush_buffer(&mut self) -> Result<usize, SendError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }
        let len = self.buffer.len();
        self.writer.write_all(&self.buffer).await?;
        self.buffer.clear();
        Ok(len)
    }

    /// Interim `100 Continue` for a client that sent `Expect: 100-continue`.
    pub async fn write_continue(&mut self) -> Result<(), SendError> {
        self.writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
        Ok(self.writer.flush().await?)
    }

    /// Sends FIN; the read half stays open.
    pub async fn shutdown(&mut self) -> Result<(), SendError> {
        Ok(self.writer.shutdown().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResponseHeaderId;

    #[test]
    fn debug_output_names_the_encoder() {
        let writer = MessageWriter::with_capacity(Vec::<u8>::new(), 16);
        let text = format!("{writer:?}");
        assert!(text.starts_with("MessageWriter"));
        assert!(text.contains("encoder: HeaderEncoder"));
    }

    #[tokio::test]
    async fn writes_head_and_chunks() {
        let mut writer = MessageWriter::with_capacity(Vec::new(), 256);
        let response = HttpResponse::new(200)
            .with_header(ResponseHeaderId::ContentLength, "11")
            .with_chunk("hello ")
            .with_stream(&b"wor"[..])
            .with_chunk("ld");

        let written = writer.write_response(response).await.unwrap();

        let text = String::from_utf8(writer.get_mut().clone()).unwrap();
        assert_eq!(written, text.len());
        assert!(text.starts_with("HTTP/1.1 200 OK\r\nDate: "));
        assert!(text.contains("\r\nContent-Length: 11\r\n"));
        assert!(text.ends_with("\r\n\r\nhello world"));
    }

    #[tokio::test]
    async fn body_is_not_padded_or_truncated() {
        let mut writer = MessageWriter::with_capacity(Vec::new(), 256);
        let response = HttpResponse::new(200).with_header(ResponseHeaderId::ContentLength, "100").with_chunk("short");

        writer.write_response(response).await.unwrap();

        let text = String::from_utf8(writer.get_mut().clone()).unwrap();
        assert!(text.ends_with("\r\n\r\nshort"));
    }
}
