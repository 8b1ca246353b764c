//! Sequential frame reading over a response body.
//!
//! This module provides [`FrameReader`]: a forward-only cursor over a byte
//! stream that reads varint tags and lengths, raw byte runs and UTF-8 text.

use std::future::poll_fn;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Bytes, BytesMut};
use futures::Stream;
use twirp_stream_core::{FrameError, decode_varint};

/// Forward-only reader of frame primitives.
///
/// Wraps a byte stream (a response body) and buffers only what is needed to
/// complete the current read. Bytes are consumed when a read completes, so a
/// read that returns `Poll::Pending` can simply be polled again later without
/// losing data. There is no way to rewind.
///
/// # Example
///
/// ```ignore
/// let mut reader = FrameReader::new(body);
///
/// let tag = reader.read_tag().await?;
/// let len = reader.read_length().await?;
/// let payload = reader.read_bytes(len).await?;
/// ```
#[derive(Debug)]
pub struct FrameReader<S> {
    /// The underlying byte stream.
    source: S,
    /// Bytes received but not consumed yet.
    buffer: BytesMut,
    /// Number of bytes consumed so far.
    position: u64,
    /// Whether the source has ended.
    exhausted: bool,
}

impl<S> FrameReader<S> {
    /// Create a new reader over `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            buffer: BytesMut::new(),
            position: 0,
            exhausted: false,
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of bytes received but not consumed yet.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn take(&mut self, len: usize) -> Bytes {
        self.position += len as u64;
        self.buffer.split_to(len).freeze()
    }
}

impl<S> FrameReader<S>
where
    S: Stream<Item = Result<Bytes, FrameError>> + Unpin,
{
    /// Pull chunks until at least `needed` bytes are buffered.
    fn poll_fill(&mut self, cx: &mut Context<'_>, needed: usize) -> Poll<Result<(), FrameError>> {
        while self.buffer.len() < needed {
            if self.exhausted {
                return Poll::Ready(Err(FrameError::UnexpectedEof {
                    expected: needed,
                    available: self.buffer.len(),
                }));
            }
            match ready!(Pin::new(&mut self.source).poll_next(cx)) {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => self.exhausted = true,
            }
        }
        Poll::Ready(Ok(()))
    }

    /// Poll for one varint.
    pub fn poll_read_varint(&mut self, cx: &mut Context<'_>) -> Poll<Result<u64, FrameError>> {
        loop {
            if let Some((value, consumed)) = decode_varint(&self.buffer)? {
                self.take(consumed);
                return Poll::Ready(Ok(value));
            }
            let needed = self.buffer.len() + 1;
            ready!(self.poll_fill(cx, needed))?;
        }
    }

    /// Poll for a field tag.
    pub fn poll_read_tag(&mut self, cx: &mut Context<'_>) -> Poll<Result<u64, FrameError>> {
        self.poll_read_varint(cx)
    }

    /// Poll for a payload length.
    pub fn poll_read_length(&mut self, cx: &mut Context<'_>) -> Poll<Result<usize, FrameError>> {
        let length = ready!(self.poll_read_varint(cx))?;
        Poll::Ready(usize::try_from(length).map_err(|_| FrameError::LengthOverflow(length)))
    }

    /// Poll for exactly `len` raw bytes.
    pub fn poll_read_bytes(
        &mut self,
        cx: &mut Context<'_>,
        len: usize,
    ) -> Poll<Result<Bytes, FrameError>> {
        ready!(self.poll_fill(cx, len))?;
        Poll::Ready(Ok(self.take(len)))
    }

    /// Poll for exactly `len` bytes of UTF-8 text.
    pub fn poll_read_string(
        &mut self,
        cx: &mut Context<'_>,
        len: usize,
    ) -> Poll<Result<String, FrameError>> {
        let bytes = ready!(self.poll_read_bytes(cx, len))?;
        Poll::Ready(
            String::from_utf8(bytes.to_vec()).map_err(|e| FrameError::InvalidUtf8(e.to_string())),
        )
    }

    /// Poll for every remaining byte of the source.
    pub fn poll_read_to_end(&mut self, cx: &mut Context<'_>) -> Poll<Result<Bytes, FrameError>> {
        while !self.exhausted {
            match ready!(Pin::new(&mut self.source).poll_next(cx)) {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Poll::Ready(Err(e)),
                None => self.exhausted = true,
            }
        }
        let len = self.buffer.len();
        Poll::Ready(Ok(self.take(len)))
    }

    /// Read one field tag.
    pub async fn read_tag(&mut self) -> Result<u64, FrameError> {
        poll_fn(|cx| self.poll_read_tag(cx)).await
    }

    /// Read one payload length.
    pub async fn read_length(&mut self) -> Result<usize, FrameError> {
        poll_fn(|cx| self.poll_read_length(cx)).await
    }

    /// Read exactly `len` raw bytes.
    pub async fn read_bytes(&mut self, len: usize) -> Result<Bytes, FrameError> {
        poll_fn(|cx| self.poll_read_bytes(cx, len)).await
    }

    /// Read exactly `len` bytes as UTF-8 text.
    pub async fn read_string(&mut self, len: usize) -> Result<String, FrameError> {
        poll_fn(|cx| self.poll_read_string(cx, len)).await
    }

    /// Read every remaining byte.
    pub async fn read_to_end(&mut self) -> Result<Bytes, FrameError> {
        poll_fn(|cx| self.poll_read_to_end(cx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use futures::channel::mpsc;
    use futures::stream;
    use twirp_stream_core::{MESSAGE_TAG, TRAILER_TAG};

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = Result<Bytes, FrameError>> + Unpin {
        let items: Vec<_> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(items)
    }

    #[tokio::test]
    async fn test_read_message_then_trailer() {
        let mut reader = FrameReader::new(chunks(&[&[10, 3, 1, 2, 3, 18, 3], b"EOF"]));

        assert_eq!(reader.read_tag().await.unwrap(), MESSAGE_TAG);
        let len = reader.read_length().await.unwrap();
        assert_eq!(reader.read_bytes(len).await.unwrap(), Bytes::from_static(&[1, 2, 3]));

        assert_eq!(reader.read_tag().await.unwrap(), TRAILER_TAG);
        let len = reader.read_length().await.unwrap();
        assert_eq!(reader.read_string(len).await.unwrap(), "EOF");
        assert_eq!(reader.position(), 10);
    }

    #[tokio::test]
    async fn test_varint_split_across_chunks() {
        // 300 = [0xAC, 0x02]
        let mut reader = FrameReader::new(chunks(&[&[0xAC], &[0x02]]));
        assert_eq!(reader.read_length().await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_payload_split_across_chunks() {
        let mut reader = FrameReader::new(chunks(&[b"he", b"l", b"lo!"]));
        assert_eq!(reader.read_bytes(5).await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(reader.buffered(), 1);
    }

    #[tokio::test]
    async fn test_short_read_is_unexpected_eof() {
        let mut reader = FrameReader::new(chunks(&[&[1, 2]]));
        let err = reader.read_bytes(4).await.unwrap_err();
        assert_eq!(
            err,
            FrameError::UnexpectedEof {
                expected: 4,
                available: 2
            }
        );
    }

    #[tokio::test]
    async fn test_tag_on_empty_body_is_unexpected_eof() {
        let mut reader = FrameReader::new(chunks(&[]));
        assert!(matches!(
            reader.read_tag().await,
            Err(FrameError::UnexpectedEof { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let mut reader = FrameReader::new(chunks(&[&[0xFF, 0xFE]]));
        assert!(matches!(
            reader.read_string(2).await,
            Err(FrameError::InvalidUtf8(_))
        ));
    }

    #[tokio::test]
    async fn test_source_error_is_returned() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(&[10])),
            Err(FrameError::Io("connection reset".into())),
        ]);
        let mut reader = FrameReader::new(source);
        assert_eq!(reader.read_tag().await.unwrap(), MESSAGE_TAG);
        assert_eq!(
            reader.read_length().await,
            Err(FrameError::Io("connection reset".into()))
        );
    }

    #[tokio::test]
    async fn test_read_to_end() {
        let mut reader = FrameReader::new(chunks(&[&[10, 3], &[1, 2, 3]]));
        assert_eq!(reader.read_tag().await.unwrap(), MESSAGE_TAG);
        assert_eq!(
            reader.read_to_end().await.unwrap(),
            Bytes::from_static(&[3, 1, 2, 3])
        );
        assert_eq!(reader.read_to_end().await.unwrap(), Bytes::new());
    }

    #[tokio::test]
    async fn test_pending_read_resumes_without_loss() {
        let (tx, rx) = mpsc::unbounded();
        let mut reader = FrameReader::new(rx);

        tx.unbounded_send(Ok(Bytes::from_static(b"ab"))).unwrap();
        assert!(reader.read_bytes(4).now_or_never().is_none());
        assert_eq!(reader.position(), 0);

        tx.unbounded_send(Ok(Bytes::from_static(b"cd"))).unwrap();
        assert_eq!(reader.read_bytes(4).await.unwrap(), Bytes::from_static(b"abcd"));
    }
}
