//! Haberdasher demo service.
//!
//! A small axum server that answers Twirp calls with protobuf messages and,
//! for server-streaming procedures, the framed streaming body the client
//! decodes: message frames followed by an `EOF` or error trailer.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::BytesMut;
use futures::{Stream, StreamExt};
use prost::Message;
use twirp_stream_core::{
    CallError, Code, encode_eof_trailer, encode_message_frame, encode_trailer_frame,
};

/// Fully-qualified service name.
pub const SERVICE: &str = "twitch.twirp.example.Haberdasher";

/// Largest size the haberdasher can make.
pub const MAX_INCHES: i32 = 40;

const PROTOBUF: &str = "application/protobuf";

#[derive(Clone, PartialEq, prost::Message)]
pub struct Size {
    #[prost(int32, tag = "1")]
    pub inches: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Hat {
    #[prost(int32, tag = "1")]
    pub inches: i32,
    #[prost(string, tag = "2")]
    pub color: String,
    #[prost(string, tag = "3")]
    pub name: String,
}

/// Returns the server address from PORT env var, defaulting to 8080.
pub fn server_addr() -> anyhow::Result<SocketAddr> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".into());
    Ok(format!("127.0.0.1:{port}").parse()?)
}

/// Router serving `MakeHat` (unary) and `MakeHats` (server streaming).
pub fn haberdasher_router() -> Router {
    Router::new()
        .route(&format!("/twirp/{SERVICE}/MakeHat"), post(make_hat))
        .route(&format!("/twirp/{SERVICE}/MakeHats"), post(make_hats))
}

async fn make_hat(body: Bytes) -> Response {
    let size = match decode_size(body) {
        Ok(size) => size,
        Err(err) => return error_response(&err),
    };
    tracing::info!(inches = size.inches, "MakeHat");

    let hat = Hat {
        inches: size.inches,
        color: "purple".to_string(),
        name: "fedora".to_string(),
    };
    ([(CONTENT_TYPE, PROTOBUF)], hat.encode_to_vec()).into_response()
}

async fn make_hats(body: Bytes) -> Response {
    let size = match decode_size(body) {
        Ok(size) => size,
        Err(err) => return error_response(&err),
    };
    tracing::info!(inches = size.inches, "MakeHats");

    let inches = size.inches;
    let hats = async_stream::stream! {
        for (i, color) in ["red", "green", "blue", "black"].into_iter().enumerate() {
            if i == 2 && inches > MAX_INCHES / 2 {
                yield Err(CallError::new(Code::ResourceExhausted, "ran out of felt")
                    .with_meta("made", i.to_string()));
                return;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            yield Ok(Hat {
                inches,
                color: color.to_string(),
                name: format!("hat #{}", i + 1),
            });
        }
    };

    ([(CONTENT_TYPE, PROTOBUF)], framed_body(hats)).into_response()
}

fn decode_size(body: Bytes) -> Result<Size, CallError> {
    let size = Size::decode(body)
        .map_err(|e| CallError::new(Code::Malformed, format!("invalid Size: {e}")))?;
    if size.inches <= 0 || size.inches > MAX_INCHES {
        return Err(CallError::new(Code::InvalidArgument, "inches out of range")
            .with_meta("argument", "inches"));
    }
    Ok(size)
}

/// Plain Twirp error response: JSON body, status from the error code.
pub fn error_response(err: &CallError) -> Response {
    let status = err
        .code_kind()
        .and_then(|code| StatusCode::from_u16(code.http_status()).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(CONTENT_TYPE, "application/json")], error_json(err)).into_response()
}

fn error_json(err: &CallError) -> String {
    err.to_payload()
        .to_json()
        .unwrap_or_else(|_| r#"{"code":"internal","msg":"unserializable error"}"#.to_string())
}

/// Encode a message stream as a framed streaming body.
///
/// Each message becomes a message frame. The body ends with an `EOF`
/// trailer, or with an error trailer at the first `Err`.
pub fn framed_body<S, M>(messages: S) -> Body
where
    S: Stream<Item = Result<M, CallError>> + Send + 'static,
    M: Message + Send + 'static,
{
    let frames = async_stream::stream! {
        let mut messages = std::pin::pin!(messages);
        while let Some(item) = messages.next().await {
            let mut buf = BytesMut::new();
            match item {
                Ok(message) => {
                    encode_message_frame(&message.encode_to_vec(), &mut buf);
                    yield Ok::<_, std::convert::Infallible>(buf.freeze());
                }
                Err(err) => {
                    encode_trailer_frame(&error_json(&err), &mut buf);
                    yield Ok(buf.freeze());
                    return;
                }
            }
        }
        let mut buf = BytesMut::new();
        encode_eof_trailer(&mut buf);
        yield Ok(buf.freeze());
    };
    Body::from_stream(frames)
}
