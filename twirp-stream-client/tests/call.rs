//! End-to-end calls against an in-process axum server.

use std::convert::Infallible;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header::CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::{BufMut, Bytes, BytesMut};
use futures::StreamExt;
use prost::Message;
use twirp_stream_client::{
    CallRequest, DecoderState, PROTOBUF_CONTENT_TYPE, RAW_ERROR_META_KEY, TwirpClient,
};
use twirp_stream_core::{encode_eof_trailer, encode_message_frame, encode_trailer_frame};

#[derive(Clone, PartialEq, prost::Message)]
struct Size {
    #[prost(int32, tag = "1")]
    inches: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
struct Hat {
    #[prost(int32, tag = "1")]
    inches: i32,
    #[prost(string, tag = "2")]
    color: String,
}

const SERVICE: &str = "twirp.test.Haberdasher";

fn twirp_error(status: StatusCode, json: &'static str) -> Response {
    (status, [(CONTENT_TYPE, "application/json")], json).into_response()
}

/// Response whose body arrives as the given chunks.
fn chunked(chunks: Vec<Bytes>) -> Response {
    let body = Body::from_stream(futures::stream::iter(
        chunks.into_iter().map(Ok::<_, Infallible>),
    ));
    ([(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)], body).into_response()
}

fn require_protobuf(headers: &HeaderMap) -> Result<(), Response> {
    match headers.get(CONTENT_TYPE) {
        Some(value) if value == PROTOBUF_CONTENT_TYPE => Ok(()),
        _ => Err(twirp_error(
            StatusCode::BAD_REQUEST,
            r#"{"code":"malformed","msg":"unexpected content type"}"#,
        )),
    }
}

/// Echo the request payload back as three message frames, one per chunk.
async fn echo_stream(headers: HeaderMap, body: Bytes) -> Response {
    if let Err(response) = require_protobuf(&headers) {
        return response;
    }
    let mut chunks = Vec::new();
    for _ in 0..3 {
        let mut frame = BytesMut::new();
        encode_message_frame(&body, &mut frame);
        chunks.push(frame.freeze());
    }
    let mut trailer = BytesMut::new();
    encode_eof_trailer(&mut trailer);
    chunks.push(trailer.freeze());
    chunked(chunks)
}

async fn stream_then_error(body: Bytes) -> Response {
    let mut buf = BytesMut::new();
    encode_message_frame(&body, &mut buf);
    encode_trailer_frame(
        r#"{"code":"resource_exhausted","msg":"out of felt","meta":{"retry_after":"5"}}"#,
        &mut buf,
    );
    chunked(vec![buf.freeze()])
}

/// One message frame, then the body fails and the connection is cut.
async fn aborted_stream() -> Response {
    let mut frame = BytesMut::new();
    encode_message_frame(&[1, 2, 3], &mut frame);
    let chunks = vec![
        Ok(frame.freeze()),
        Err(std::io::Error::other("server aborted")),
    ];
    let body = Body::from_stream(futures::stream::iter(chunks));
    ([(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)], body).into_response()
}

async fn empty_stream() -> Response {
    let mut buf = BytesMut::new();
    encode_eof_trailer(&mut buf);
    chunked(vec![buf.freeze()])
}

async fn echo_unary(headers: HeaderMap, body: Bytes) -> Response {
    if let Err(response) = require_protobuf(&headers) {
        return response;
    }
    ([(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)], body).into_response()
}

async fn api_key(headers: HeaderMap) -> Response {
    let key = headers
        .get("x-api-key")
        .map(|v| Bytes::copy_from_slice(v.as_bytes()))
        .unwrap_or_default();
    ([("x-served-by", "test")], key).into_response()
}

async fn internal_error() -> Response {
    twirp_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"code":"internal","msg":"boom"}"#,
    )
}

async fn gateway_error() -> Response {
    (StatusCode::BAD_GATEWAY, "upstream unavailable").into_response()
}

async fn make_hats(body: Bytes) -> Response {
    let size = match Size::decode(body) {
        Ok(size) => size,
        Err(_) => {
            return twirp_error(
                StatusCode::BAD_REQUEST,
                r#"{"code":"malformed","msg":"bad size"}"#,
            );
        }
    };
    if size.inches <= 0 {
        let mut buf = BytesMut::new();
        encode_trailer_frame(
            r#"{"code":"invalid_argument","msg":"inches must be positive","meta":{"argument":"inches"}}"#,
            &mut buf,
        );
        return chunked(vec![buf.freeze()]);
    }

    let mut chunks = Vec::new();
    for color in ["red", "green", "blue"] {
        let hat = Hat {
            inches: size.inches,
            color: color.to_string(),
        };
        let mut frame = BytesMut::new();
        encode_message_frame(&hat.encode_to_vec(), &mut frame);
        chunks.push(frame.freeze());
    }
    let mut trailer = BytesMut::new();
    encode_eof_trailer(&mut trailer);
    chunks.push(trailer.freeze());
    chunked(chunks)
}

async fn make_hat(body: Bytes) -> Response {
    let size = Size::decode(body).unwrap_or_default();
    let hat = Hat {
        inches: size.inches,
        color: "purple".to_string(),
    };
    ([(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)], hat.encode_to_vec()).into_response()
}

async fn garbage_unary() -> Response {
    let mut buf = BytesMut::new();
    // Field 2, length-delimited, claims 100 bytes but has none.
    buf.put_slice(&[18, 100]);
    ([(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)], buf.freeze()).into_response()
}

fn router() -> Router {
    Router::new()
        .route("/twirp/twirp.test.Haberdasher/EchoStream", post(echo_stream))
        .route("/twirp/twirp.test.Haberdasher/StreamThenError", post(stream_then_error))
        .route("/twirp/twirp.test.Haberdasher/EmptyStream", post(empty_stream))
        .route("/twirp/twirp.test.Haberdasher/Aborted", post(aborted_stream))
        .route("/twirp/twirp.test.Haberdasher/Echo", post(echo_unary))
        .route("/twirp/twirp.test.Haberdasher/ApiKey", post(api_key))
        .route("/twirp/twirp.test.Haberdasher/Internal", post(internal_error))
        .route("/twirp/twirp.test.Haberdasher/Gateway", post(gateway_error))
        .route("/twirp/twirp.test.Haberdasher/MakeHats", post(make_hats))
        .route("/twirp/twirp.test.Haberdasher/MakeHat", post(make_hat))
        .route("/twirp/twirp.test.Haberdasher/Garbage", post(garbage_unary))
}

async fn spawn_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router()).await.unwrap();
    });
    format!("http://{addr}")
}

async fn client() -> TwirpClient {
    TwirpClient::new(spawn_server().await).unwrap()
}

fn procedure(method: &str) -> String {
    format!("{SERVICE}/{method}")
}

#[tokio::test]
async fn test_streaming_call_yields_messages_then_completes() {
    let client = client().await;
    let url = client.url_for(&procedure("EchoStream"));

    let response = client
        .call(CallRequest::server_stream(url, vec![1u8, 2, 3]))
        .await
        .unwrap();
    assert_eq!(
        response.metadata().get("content-type"),
        Some(PROTOBUF_CONTENT_TYPE)
    );

    let mut stream = response.into_inner();
    let mut payloads = Vec::new();
    while let Some(item) = stream.next().await {
        payloads.push(item.unwrap());
    }
    assert_eq!(payloads, vec![Bytes::from_static(&[1, 2, 3]); 3]);
    assert_eq!(stream.state(), DecoderState::Completed);
}

#[tokio::test]
async fn test_streaming_call_with_only_eof_is_empty() {
    let client = client().await;
    let url = client.url_for(&procedure("EmptyStream"));

    let stream = client
        .call(CallRequest::server_stream(url, Bytes::new()))
        .await
        .unwrap()
        .into_inner();
    let items: Vec<_> = stream.collect().await;
    assert!(items.is_empty());
}

#[tokio::test]
async fn test_error_trailer_ends_stream_with_call_error() {
    let client = client().await;
    let url = client.url_for(&procedure("StreamThenError"));

    let items: Vec<_> = client
        .call(CallRequest::server_stream(url, vec![9u8]))
        .await
        .unwrap()
        .into_inner()
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok(Bytes::from_static(&[9])));
    let err = items[1].clone().unwrap_err();
    assert_eq!(err.code(), "resource_exhausted");
    assert_eq!(err.message(), "out of felt");
    assert_eq!(err.meta("retry_after"), Some("5"));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_aborted_body_is_read_failure() {
    let client = client().await;
    let url = client.url_for(&procedure("Aborted"));

    let items: Vec<_> = client
        .call(CallRequest::server_stream(url, Bytes::new()))
        .await
        .unwrap()
        .into_inner()
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert_eq!(items[0], Ok(Bytes::from_static(&[1, 2, 3])));
    let err = items[1].clone().unwrap_err();
    assert_eq!(err.code(), "internal");
    assert_eq!(err.message(), "Failed to read response");
    assert!(err.meta("cause").unwrap().starts_with("i/o error: "));
}

#[tokio::test]
async fn test_http_error_fails_call() {
    let client = client().await;
    let url = client.url_for(&procedure("Internal"));

    let err = client
        .call(CallRequest::server_stream(url, Bytes::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "internal");
    assert_eq!(err.message(), "boom");
    assert!(err.metadata().is_empty());
}

#[tokio::test]
async fn test_http_error_with_non_json_body() {
    let client = client().await;
    let url = client.url_for(&procedure("Gateway"));

    let err = client
        .call(CallRequest::unary(url, Bytes::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "internal");
    assert!(err.message().starts_with("Unable to decode error: "));
    assert_eq!(err.meta(RAW_ERROR_META_KEY), Some("upstream unavailable"));
}

#[tokio::test]
async fn test_unknown_route_is_http_error() {
    let client = client().await;
    let url = client.url_for(&procedure("Missing"));

    let err = client
        .call(CallRequest::unary(url, Bytes::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "internal");
    assert!(err.meta(RAW_ERROR_META_KEY).is_some());
}

#[tokio::test]
async fn test_unary_call_returns_raw_body() {
    let client = client().await;
    let url = client.url_for(&procedure("Echo"));

    // Looks like frames, but unary responses are never parsed as frames.
    let payload: Vec<u8> = vec![10, 3, 1, 2, 3, 18, 3, b'E', b'O', b'F'];
    let items: Vec<_> = client
        .call(CallRequest::unary(url, payload.clone()))
        .await
        .unwrap()
        .into_inner()
        .collect()
        .await;
    assert_eq!(items, vec![Ok(Bytes::from(payload))]);
}

#[tokio::test]
async fn test_default_headers_are_sent() {
    let server = spawn_server().await;
    let client = TwirpClient::builder(server)
        .header(
            http::HeaderName::from_static("x-api-key"),
            http::HeaderValue::from_static("secret"),
        )
        .build()
        .unwrap();
    let url = client.url_for(&procedure("ApiKey"));

    let response = client.call(CallRequest::unary(url, Bytes::new())).await.unwrap();
    assert_eq!(response.metadata().get("x-served-by"), Some("test"));
    let body = response.into_inner().single().await.unwrap();
    assert_eq!(body, Bytes::from_static(b"secret"));
}

#[tokio::test]
async fn test_typed_server_stream() {
    let client = client().await;

    let response = client
        .call_server_stream::<Size, Hat>(&procedure("MakeHats"), &Size { inches: 12 })
        .await
        .unwrap();
    let hats: Vec<_> = response.into_inner().collect().await;

    let colors: Vec<_> = hats
        .into_iter()
        .map(|hat| {
            let hat = hat.unwrap();
            assert_eq!(hat.inches, 12);
            hat.color
        })
        .collect();
    assert_eq!(colors, ["red", "green", "blue"]);
}

#[tokio::test]
async fn test_typed_server_stream_error() {
    let client = client().await;

    let mut hats = client
        .call_server_stream::<Size, Hat>(&procedure("MakeHats"), &Size { inches: 0 })
        .await
        .unwrap()
        .into_inner();

    let err = hats.next().await.unwrap().unwrap_err();
    assert_eq!(err.code(), "invalid_argument");
    assert_eq!(err.meta("argument"), Some("inches"));
    assert!(hats.next().await.is_none());
    assert_eq!(hats.state(), DecoderState::Failed);
}

#[tokio::test]
async fn test_typed_unary() {
    let client = client().await;

    let hat = client
        .call_unary::<Size, Hat>(&procedure("MakeHat"), &Size { inches: 7 })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(
        hat,
        Hat {
            inches: 7,
            color: "purple".to_string()
        }
    );
}

#[tokio::test]
async fn test_typed_unary_decode_failure() {
    let client = client().await;

    let err = client
        .call_unary::<Size, Hat>(&procedure("Garbage"), &Size { inches: 7 })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "internal");
    assert_eq!(err.message(), "Unable to decode response");
    assert!(err.meta("cause").is_some());
}

#[tokio::test]
async fn test_drain_after_partial_read() {
    let client = client().await;
    let url = client.url_for(&procedure("EchoStream"));

    let mut stream = client
        .call(CallRequest::server_stream(url, vec![4u8]))
        .await
        .unwrap()
        .into_inner();
    assert!(stream.next().await.unwrap().is_ok());
    assert_eq!(stream.drain().await, 2);
    assert!(stream.is_finished());
}

#[tokio::test]
async fn test_connection_refused_is_request_failed() {
    // Reserve a port, then free it so nothing is listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = TwirpClient::new(format!("http://{addr}")).unwrap();
    let url = client.url_for(&procedure("Echo"));

    let err = client
        .call(CallRequest::unary(url, Bytes::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "internal");
    assert_eq!(err.message(), "Request failed");
    assert!(err.meta("cause").is_some());
}
