//! Streaming Twirp client for Rust.
//!
//! Every call is a single HTTP POST carrying one serialized protobuf message.
//! The response is either one message, or a sequence of length-delimited
//! message frames closed by a trailer frame that signals either a clean end
//! of stream or a Twirp error.
//!
//! ## Features
//!
//! - Unary calls
//! - Server streaming calls, consumed lazily as a [`futures::Stream`]
//! - One error type, [`CallError`], for transport failures, HTTP errors,
//!   malformed frames and errors sent by the server mid-stream
//! - HTTP/1.1 and HTTP/2 over hyper with rustls
//!
//! ## Example
//!
//! ```ignore
//! use twirp_stream_client::TwirpClient;
//!
//! let client = TwirpClient::builder("http://localhost:8080").build()?;
//!
//! let hat = client
//!     .call_unary::<Size, Hat>("twitch.twirp.example.Haberdasher/MakeHat", &Size { inches: 12 })
//!     .await?
//!     .into_inner();
//! ```
//!
//! ## Server Streaming Example
//!
//! ```ignore
//! use futures::StreamExt;
//! use twirp_stream_client::TwirpClient;
//!
//! let client = TwirpClient::builder("http://localhost:8080").build()?;
//!
//! let response = client
//!     .call_server_stream::<Size, Hat>("twitch.twirp.example.Haberdasher/MakeHats", &size)
//!     .await?;
//!
//! let mut hats = response.into_inner();
//! while let Some(result) = hats.next().await {
//!     match result {
//!         Ok(hat) => println!("Got hat: {:?}", hat),
//!         Err(e) => eprintln!("Error: {e}"),
//!     }
//! }
//! ```
//!
//! ## Raw Payloads
//!
//! [`TwirpClient::call`] works on bytes and leaves decoding to the caller:
//!
//! ```ignore
//! let url = client.url_for("twitch.twirp.example.Haberdasher/MakeHats");
//! let response = client.call(CallRequest::server_stream(url, payload)).await?;
//! let payloads: Vec<_> = response.into_inner().collect().await;
//! ```

mod builder;
mod client;
pub mod frame;
mod request;
pub mod response;
mod streaming;
pub mod transport;

pub use builder::{ClientBuildError, ClientBuilder, DEFAULT_PATH_PREFIX};
pub use client::{PROTOBUF_CONTENT_TYPE, TwirpClient};
pub use frame::FrameReader;
pub use request::CallRequest;
pub use response::{DecoderState, Metadata, StreamDecoder, TwirpResponse};
pub use streaming::{DecodeMessages, Streaming};
pub use transport::{BodyStream, HyperTransport, HyperTransportBuilder, TlsClientConfig};

// Re-export core types
pub use twirp_stream_core::{
    CallError, Code, FrameError, RAW_ERROR_META_KEY, TwirpErrorPayload, hex_bytes,
    parse_error_payload, print_bytes,
};

// Re-export commonly used external types
pub use bytes::Bytes;
