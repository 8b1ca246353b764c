//! Streaming response decoding.
//!
//! This module provides [`StreamDecoder`]: a stream adapter that turns a
//! response body into the ordered sequence of message payloads it carries.

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::Stream;
use futures::stream::FusedStream;
use twirp_stream_core::{
    CallError, EOF_MARKER, FrameError, MESSAGE_TAG, RAW_ERROR_META_KEY, TRAILER_TAG,
    parse_error_payload,
};

use crate::frame::FrameReader;

/// Observable state of a [`StreamDecoder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecoderState {
    /// More items may follow.
    AwaitingFrame,
    /// The body ended cleanly.
    Completed,
    /// The body ended with an error.
    Failed,
}

/// Position inside the current frame.
#[derive(Clone, Copy, Debug)]
enum Step {
    Tag,
    MessageLength,
    MessageBody(usize),
    TrailerLength,
    TrailerBody(usize),
}

#[derive(Debug)]
enum Phase<S> {
    /// Whole body is one payload.
    Unary(FrameReader<S>),
    /// Body is a sequence of frames ending in a trailer.
    Framed { reader: FrameReader<S>, step: Step },
    Completed,
    Failed,
}

/// Result of one decode step.
enum Outcome {
    Continue,
    Message(Bytes),
    Last(Bytes),
    Eof,
}

/// Stream adapter that decodes a streaming Twirp response body.
///
/// Yields each message payload in wire order, then ends. A trailer carrying
/// `EOF` ends the stream cleanly; a trailer carrying an error, an unknown
/// frame tag or a failed read yields exactly one `Err` and then ends.
///
/// The body is dropped as soon as the decoder reaches a terminal state, or
/// when the decoder itself is dropped, whichever comes first.
///
/// # Frame Format
///
/// ```text
/// [tag:varint][length:varint][payload:length]
/// ```
///
/// Tags:
/// - `10`: Message payload
/// - `18`: Trailer, UTF-8 text that is `EOF` or an error JSON object
///
/// # Example
///
/// ```ignore
/// let mut decoder = StreamDecoder::streaming(body);
///
/// while let Some(payload) = decoder.next().await {
///     let payload = payload?;
///     println!("{} bytes", payload.len());
/// }
/// ```
#[derive(Debug)]
pub struct StreamDecoder<S> {
    phase: Phase<S>,
}

impl<S> StreamDecoder<S> {
    /// Decode `source` as a framed stream.
    pub fn streaming(source: S) -> Self {
        Self {
            phase: Phase::Framed {
                reader: FrameReader::new(source),
                step: Step::Tag,
            },
        }
    }

    /// Decode `source` as a single unframed payload.
    pub fn unary(source: S) -> Self {
        Self {
            phase: Phase::Unary(FrameReader::new(source)),
        }
    }

    /// Current state.
    pub fn state(&self) -> DecoderState {
        match self.phase {
            Phase::Unary(_) | Phase::Framed { .. } => DecoderState::AwaitingFrame,
            Phase::Completed => DecoderState::Completed,
            Phase::Failed => DecoderState::Failed,
        }
    }

    /// Returns true once a terminal state has been reached.
    pub fn is_finished(&self) -> bool {
        self.state() != DecoderState::AwaitingFrame
    }

    fn complete(&mut self) {
        tracing::debug!("response stream completed");
        self.phase = Phase::Completed;
    }

    fn fail(&mut self, err: &CallError) {
        tracing::debug!(code = err.code(), message = err.message(), "response stream failed");
        self.phase = Phase::Failed;
    }
}

impl<S> Stream for StreamDecoder<S>
where
    S: Stream<Item = Result<Bytes, FrameError>> + Unpin,
{
    type Item = Result<Bytes, CallError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let result = match &mut this.phase {
                Phase::Completed | Phase::Failed => return Poll::Ready(None),
                Phase::Unary(reader) => ready!(reader.poll_read_to_end(cx))
                    .map(Outcome::Last)
                    .map_err(read_failure),
                Phase::Framed { reader, step } => ready!(poll_step(reader, step, cx)),
            };

            match result {
                Ok(Outcome::Continue) => continue,
                Ok(Outcome::Message(payload)) => return Poll::Ready(Some(Ok(payload))),
                Ok(Outcome::Last(payload)) => {
                    this.complete();
                    return Poll::Ready(Some(Ok(payload)));
                }
                Ok(Outcome::Eof) => {
                    this.complete();
                    return Poll::Ready(None);
                }
                Err(err) => {
                    this.fail(&err);
                    return Poll::Ready(Some(Err(err)));
                }
            }
        }
    }
}

impl<S> FusedStream for StreamDecoder<S>
where
    S: Stream<Item = Result<Bytes, FrameError>> + Unpin,
{
    fn is_terminated(&self) -> bool {
        self.is_finished()
    }
}

/// Advance the framed decoder by one read.
fn poll_step<S>(
    reader: &mut FrameReader<S>,
    step: &mut Step,
    cx: &mut Context<'_>,
) -> Poll<Result<Outcome, CallError>>
where
    S: Stream<Item = Result<Bytes, FrameError>> + Unpin,
{
    let outcome = match *step {
        Step::Tag => {
            let tag = ready!(reader.poll_read_tag(cx)).map_err(read_failure)?;
            tracing::trace!(tag, position = reader.position(), "read frame tag");
            *step = match tag {
                MESSAGE_TAG => Step::MessageLength,
                TRAILER_TAG => Step::TrailerLength,
                other => return Poll::Ready(Err(invalid_tag(other))),
            };
            Outcome::Continue
        }
        Step::MessageLength => {
            let len = ready!(reader.poll_read_length(cx)).map_err(read_failure)?;
            *step = Step::MessageBody(len);
            Outcome::Continue
        }
        Step::MessageBody(len) => {
            let payload = ready!(reader.poll_read_bytes(cx, len)).map_err(read_failure)?;
            tracing::trace!(len, position = reader.position(), "read message frame");
            *step = Step::Tag;
            Outcome::Message(payload)
        }
        Step::TrailerLength => {
            let len = ready!(reader.poll_read_length(cx)).map_err(read_failure)?;
            *step = Step::TrailerBody(len);
            Outcome::Continue
        }
        Step::TrailerBody(len) => {
            let text = ready!(reader.poll_read_string(cx, len)).map_err(read_failure)?;
            tracing::trace!(len, position = reader.position(), "read trailer frame");
            if text != EOF_MARKER {
                return Poll::Ready(Err(trailer_error(&text)));
            }
            Outcome::Eof
        }
    };
    Poll::Ready(Ok(outcome))
}

fn read_failure(err: FrameError) -> CallError {
    CallError::with_cause("Failed to read response", &err)
}

fn invalid_tag(tag: u64) -> CallError {
    CallError::internal("Invalid field tag").with_meta("fieldTag", tag.to_string())
}

fn trailer_error(text: &str) -> CallError {
    let err = parse_error_payload(text.as_bytes());
    if err.meta(RAW_ERROR_META_KEY).is_some() {
        tracing::warn!(trailer = text, "undecodable error trailer");
    }
    err
}
