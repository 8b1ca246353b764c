//! Streaming response wrappers.
//!
//! This module provides [`Streaming`], the sequence of raw payloads returned
//! by a call, and [`DecodeMessages`], the same sequence decoded into protobuf
//! messages.
//!
//! # Cancellation
//!
//! Dropping either wrapper drops the response body, which closes the HTTP
//! stream. The server sees this as a reset connection or stream.

use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use prost::Message;
use twirp_stream_core::{CallError, FrameError};

use crate::response::{DecoderState, StreamDecoder};

/// Wrapper for the payloads of a response.
///
/// # Example
///
/// ```ignore
/// let response = client.call(CallRequest::server_stream(url, payload)).await?;
/// let mut stream = response.into_inner();
///
/// while let Some(result) = stream.next().await {
///     match result {
///         Ok(payload) => println!("Got {} bytes", payload.len()),
///         Err(e) => eprintln!("Error: {e}"),
///     }
/// }
/// ```
pub struct Streaming<S> {
    inner: StreamDecoder<S>,
}

impl<S> std::fmt::Debug for Streaming<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Streaming")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<S> Streaming<S> {
    /// Create a new Streaming wrapping the given decoder.
    pub fn new(inner: StreamDecoder<S>) -> Self {
        Self { inner }
    }

    /// Get a reference to the decoder.
    pub fn get_ref(&self) -> &StreamDecoder<S> {
        &self.inner
    }

    /// Consume the wrapper and return the decoder.
    pub fn into_inner(self) -> StreamDecoder<S> {
        self.inner
    }

    /// Current decoder state.
    pub fn state(&self) -> DecoderState {
        self.inner.state()
    }

    /// Check if the stream has finished.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Decode each payload as a protobuf message of type `M`.
    pub fn decode<M>(self) -> DecodeMessages<S, M> {
        DecodeMessages {
            inner: Some(self.inner),
            _marker: PhantomData,
        }
    }
}

impl<S> Streaming<S>
where
    S: Stream<Item = Result<Bytes, FrameError>> + Unpin,
{
    /// Take the first payload and release the body.
    ///
    /// For a unary call this is the response message. A streaming response
    /// that ends before any message fails with an `internal` error.
    pub async fn single(mut self) -> Result<Bytes, CallError> {
        match self.inner.next().await {
            Some(result) => result,
            None => Err(CallError::internal("Response contained no message")),
        }
    }

    /// Drain all remaining payloads from the stream.
    ///
    /// Returns the number of payloads that were drained (not including the
    /// error, if the stream ended with one).
    pub async fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Some(result) = self.inner.next().await {
            if result.is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Drain remaining payloads with a timeout.
    ///
    /// Returns `Ok(count)` if the stream was fully drained, or `Err(count)`
    /// if the timeout expired first.
    pub async fn drain_timeout(&mut self, timeout: Duration) -> Result<usize, usize> {
        let mut count = 0;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            tokio::select! {
                biased;

                _ = tokio::time::sleep_until(deadline) => {
                    return Err(count);
                }

                item = self.inner.next() => {
                    match item {
                        Some(Ok(_)) => count += 1,
                        Some(Err(_)) => {}
                        None => return Ok(count),
                    }
                }
            }
        }
    }
}

impl<S> Stream for Streaming<S>
where
    S: Stream<Item = Result<Bytes, FrameError>> + Unpin,
{
    type Item = Result<Bytes, CallError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// A response stream decoded into messages of type `M`.
///
/// A payload that does not decode as `M` yields one `internal` error with
/// message `Unable to decode response`, releases the body, and ends the
/// stream.
pub struct DecodeMessages<S, M> {
    /// `None` once decoding failed.
    inner: Option<StreamDecoder<S>>,
    _marker: PhantomData<fn() -> M>,
}

impl<S, M> DecodeMessages<S, M> {
    /// Current state.
    pub fn state(&self) -> DecoderState {
        match &self.inner {
            Some(decoder) => decoder.state(),
            None => DecoderState::Failed,
        }
    }
}

impl<S, M> std::fmt::Debug for DecodeMessages<S, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeMessages")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<S, M> Stream for DecodeMessages<S, M>
where
    S: Stream<Item = Result<Bytes, FrameError>> + Unpin,
    M: Message + Default,
{
    type Item = Result<M, CallError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(decoder) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match ready!(Pin::new(decoder).poll_next(cx)) {
            Some(Ok(payload)) => {
                let result = decode_message(payload);
                if result.is_err() {
                    this.inner = None;
                }
                Poll::Ready(Some(result))
            }
            Some(Err(err)) => Poll::Ready(Some(Err(err))),
            None => Poll::Ready(None),
        }
    }
}

/// Decode one payload as `M`.
///
/// An empty payload decodes to `M::default()`.
pub(crate) fn decode_message<M>(payload: Bytes) -> Result<M, CallError>
where
    M: Message + Default,
{
    M::decode(payload).map_err(|e| {
        tracing::debug!(error = %e, "failed to decode response message");
        CallError::with_cause("Unable to decode response", &e)
    })
}
