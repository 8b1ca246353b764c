//! The Twirp client.

use http::Method;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use prost::Message;
use tracing::{Instrument, info_span};
use twirp_stream_core::{CallError, RAW_ERROR_META_KEY, parse_error_payload};

use crate::builder::{ClientBuildError, ClientBuilder};
use crate::request::CallRequest;
use crate::response::{Metadata, StreamDecoder, TwirpResponse};
use crate::streaming::{DecodeMessages, Streaming, decode_message};
use crate::transport::{BodyStream, HyperTransport, TransportBody, body_to_stream};

/// Content type of every request.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/protobuf";

/// Client for Twirp services whose responses may be framed streams.
///
/// Each call is one HTTP POST. The response is a single message, or, for
/// server-streaming procedures, a sequence of message frames closed by a
/// trailer frame.
///
/// Cloning is cheap and clones share the transport's connection pool.
///
/// # Example
///
/// ```ignore
/// use twirp_stream_client::TwirpClient;
/// use futures::StreamExt;
///
/// let client = TwirpClient::builder("http://localhost:8080").build()?;
///
/// let response = client
///     .call_server_stream::<Size, Hat>("twitch.twirp.example.Haberdasher/MakeHats", &size)
///     .await?;
///
/// let mut hats = response.into_inner();
/// while let Some(hat) = hats.next().await {
///     println!("{:?}", hat?);
/// }
/// ```
#[derive(Clone, Debug)]
pub struct TwirpClient {
    transport: HyperTransport,
    /// Base URL without trailing slash.
    base_url: String,
    /// Route prefix, empty or starting with a slash.
    path_prefix: String,
    /// Headers sent with every call.
    headers: HeaderMap,
}

impl TwirpClient {
    /// Create a new client builder.
    pub fn builder<S: Into<String>>(base_url: S) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    /// Create a client with default settings.
    pub fn new<S: Into<String>>(base_url: S) -> Result<Self, ClientBuildError> {
        Self::builder(base_url).build()
    }

    pub(crate) fn from_parts(
        transport: HyperTransport,
        base_url: String,
        path_prefix: String,
        headers: HeaderMap,
    ) -> Self {
        Self {
            transport,
            base_url,
            path_prefix,
            headers,
        }
    }

    /// The base URL calls are made against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a procedure, given as `package.Service/Method`.
    ///
    /// ```ignore
    /// let client = TwirpClient::new("http://localhost:8080")?;
    /// assert_eq!(
    ///     client.url_for("twitch.twirp.example.Haberdasher/MakeHat"),
    ///     "http://localhost:8080/twirp/twitch.twirp.example.Haberdasher/MakeHat",
    /// );
    /// ```
    pub fn url_for(&self, procedure: &str) -> String {
        let procedure = procedure.trim_start_matches('/');
        format!("{}{}/{}", self.base_url, self.path_prefix, procedure)
    }

    /// Issue a call and return its payloads.
    ///
    /// Fails immediately when the request cannot be sent or the server
    /// answers with a non-success status. Otherwise the body is handed to a
    /// [`StreamDecoder`]: framed when the request is streaming, a single
    /// payload when it is not. Nothing is retried.
    pub async fn call(
        &self,
        request: CallRequest,
    ) -> Result<TwirpResponse<Streaming<BodyStream>>, CallError> {
        let span = info_span!(
            "twirp.call",
            url = %request.url(),
            streaming = request.is_streaming(),
            otel.kind = "client",
        );
        self.execute(request).instrument(span).await
    }

    async fn execute(
        &self,
        request: CallRequest,
    ) -> Result<TwirpResponse<Streaming<BodyStream>>, CallError> {
        let http_request = self.build_request(&request)?;
        let response = self.transport.request(http_request).await.inspect_err(|err| {
            tracing::debug!(error = %err, "request failed");
        })?;

        let status = response.status();
        tracing::debug!(status = status.as_u16(), "received response");

        let (parts, body) = response.into_parts();
        if !status.is_success() {
            return Err(error_from_body(body).await);
        }

        let source = body_to_stream(body);
        let decoder = if request.is_streaming() {
            StreamDecoder::streaming(source)
        } else {
            StreamDecoder::unary(source)
        };
        Ok(TwirpResponse::new(
            Streaming::new(decoder),
            Metadata::new(parts.headers),
        ))
    }

    fn build_request(
        &self,
        request: &CallRequest,
    ) -> Result<http::Request<TransportBody>, CallError> {
        let mut http_request = http::Request::builder()
            .method(Method::POST)
            .uri(request.url())
            .body(TransportBody::full(request.payload().clone()))
            .map_err(|e| CallError::with_cause("Request failed", &e))?;

        let headers = http_request.headers_mut();
        headers.extend(self.headers.clone());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(PROTOBUF_CONTENT_TYPE));
        Ok(http_request)
    }

    /// Call a unary procedure.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let hat = client
    ///     .call_unary::<Size, Hat>("twitch.twirp.example.Haberdasher/MakeHat", &Size { inches: 12 })
    ///     .await?
    ///     .into_inner();
    /// ```
    pub async fn call_unary<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
    ) -> Result<TwirpResponse<Res>, CallError>
    where
        Req: Message,
        Res: Message + Default,
    {
        let request = CallRequest::from_message(self.url_for(procedure), request, false);
        let (streaming, metadata) = self.call(request).await?.into_parts();
        let message = decode_message(streaming.single().await?)?;
        Ok(TwirpResponse::new(message, metadata))
    }

    /// Call a server-streaming procedure.
    ///
    /// The returned stream yields each decoded message in order. It ends
    /// after the server's end-of-stream trailer, or after exactly one error.
    pub async fn call_server_stream<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
    ) -> Result<TwirpResponse<DecodeMessages<BodyStream, Res>>, CallError>
    where
        Req: Message,
        Res: Message + Default,
    {
        let request = CallRequest::from_message(self.url_for(procedure), request, true);
        let response = self.call(request).await?;
        Ok(response.map(Streaming::decode))
    }
}

/// Turn the body of a non-success response into an error.
async fn error_from_body(body: Incoming) -> CallError {
    let raw = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return CallError::with_cause("Failed to read response", &e),
    };

    let err = parse_error_payload(&raw);
    if err.meta(RAW_ERROR_META_KEY).is_some() {
        tracing::warn!(body = %String::from_utf8_lossy(&raw), "undecodable error response");
    }
    tracing::debug!(code = err.code(), message = err.message(), "call failed");
    err
}

#[cfg(all(
    test,
    any(feature = "tls-ring", feature = "tls-aws-lc"),
    any(feature = "tls-native-roots", feature = "tls-webpki-roots")
))]
mod tests {
    use super::*;

    #[test]
    fn test_url_for() {
        let client = TwirpClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(
            client.url_for("twitch.twirp.example.Haberdasher/MakeHat"),
            "http://localhost:8080/twirp/twitch.twirp.example.Haberdasher/MakeHat"
        );
        assert_eq!(
            client.url_for("/a.B/C"),
            "http://localhost:8080/twirp/a.B/C"
        );
    }

    #[test]
    fn test_url_for_custom_prefix() {
        let client = TwirpClient::builder("https://api.example.com")
            .path_prefix("")
            .build()
            .unwrap();
        assert_eq!(client.url_for("a.B/C"), "https://api.example.com/a.B/C");
    }

    #[test]
    fn test_build_request_headers() {
        let client = TwirpClient::builder("http://localhost:8080")
            .header(
                http::header::HeaderName::from_static("x-api-key"),
                HeaderValue::from_static("secret"),
            )
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .build()
            .unwrap();

        let request = CallRequest::unary(client.url_for("a.B/C"), vec![1u8, 2, 3]);
        let http_request = client.build_request(&request).unwrap();

        assert_eq!(http_request.method(), Method::POST);
        assert_eq!(http_request.uri(), "http://localhost:8080/twirp/a.B/C");
        assert_eq!(http_request.headers()["x-api-key"], "secret");
        assert_eq!(
            http_request.headers().get_all(CONTENT_TYPE).iter().collect::<Vec<_>>(),
            [PROTOBUF_CONTENT_TYPE]
        );
    }

    #[test]
    fn test_build_request_invalid_url() {
        let client = TwirpClient::new("http://localhost:8080").unwrap();
        let err = client
            .build_request(&CallRequest::unary("not a url", Vec::<u8>::new()))
            .unwrap_err();
        assert_eq!(err.code(), "internal");
        assert_eq!(err.message(), "Request failed");
        assert!(err.meta("cause").is_some());
    }
}
