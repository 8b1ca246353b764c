//! Request and response body types for the HTTP transport.
//!
//! This module provides [`TransportBody`], the request body sent by the
//! client, and [`BodyStream`], the response body as a byte stream.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use http_body::{Body, Frame};
use http_body_util::BodyExt;
use twirp_stream_core::FrameError;

/// A request body.
///
/// Twirp requests always carry one complete serialized message, sent as a
/// single chunk.
pub struct TransportBody {
    data: Option<Bytes>,
}

impl TransportBody {
    /// Create a body with the given data.
    pub fn full(data: Bytes) -> Self {
        Self { data: Some(data) }
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.get_mut().data.take().map(|d| Ok(Frame::data(d))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        let len = self.data.as_ref().map_or(0, |d| d.len() as u64);
        http_body::SizeHint::with_exact(len)
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBody")
            .field("data_len", &self.data.as_ref().map(|d| d.len()))
            .finish()
    }
}

/// A response body as a stream of data chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, FrameError>> + Send>>;

/// Turn a response body into a [`BodyStream`].
///
/// HTTP trailers and empty chunks are skipped. A body error becomes
/// [`FrameError::Io`] carrying the error's whole source chain. Dropping the
/// stream drops the body, which releases the connection.
pub fn body_to_stream<B>(body: B) -> BodyStream
where
    B: Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: std::error::Error + Send,
{
    futures::stream::unfold(body, |mut body| async move {
        match body.frame().await {
            Some(Ok(frame)) => {
                // Trailers or other frame types become an empty chunk.
                let data = frame.into_data().unwrap_or_default();
                Some((Ok(data), body))
            }
            Some(Err(e)) => Some((Err(FrameError::io(&e)), body)),
            None => None,
        }
    })
    .filter(|result| {
        futures::future::ready(match result {
            Ok(bytes) => !bytes.is_empty(),
            Err(_) => true,
        })
    })
    .boxed()
}
