//! Call request type.

use bytes::Bytes;
use prost::Message;

/// One call: where to send it, what to send, and how to read the answer.
///
/// The payload is sent as-is as the request body. When `streaming` is set,
/// the response body is decoded as a sequence of frames; otherwise the whole
/// body is one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    url: String,
    payload: Bytes,
    streaming: bool,
}

impl CallRequest {
    /// Create a request from its three parts.
    pub fn new<U, P>(url: U, payload: P, streaming: bool) -> Self
    where
        U: Into<String>,
        P: Into<Bytes>,
    {
        Self {
            url: url.into(),
            payload: payload.into(),
            streaming,
        }
    }

    /// Create a request whose response is a single message.
    pub fn unary<U: Into<String>, P: Into<Bytes>>(url: U, payload: P) -> Self {
        Self::new(url, payload, false)
    }

    /// Create a request whose response is a framed stream.
    pub fn server_stream<U: Into<String>, P: Into<Bytes>>(url: U, payload: P) -> Self {
        Self::new(url, payload, true)
    }

    /// Create a request carrying an encoded protobuf message.
    pub fn from_message<U, M>(url: U, message: &M, streaming: bool) -> Self
    where
        U: Into<String>,
        M: Message,
    {
        Self::new(url, message.encode_to_vec(), streaming)
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serialized request message.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Whether the response is a framed stream.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let unary = CallRequest::unary("http://localhost/twirp/a.B/C", vec![1u8, 2]);
        assert!(!unary.is_streaming());
        assert_eq!(unary.payload().as_ref(), &[1, 2]);

        let stream = CallRequest::server_stream("http://localhost/twirp/a.B/C", Bytes::new());
        assert!(stream.is_streaming());
        assert_eq!(stream.url(), "http://localhost/twirp/a.B/C");
    }

    #[test]
    fn test_from_message() {
        // A protobuf string: field 1, "hi"
        let request = CallRequest::from_message("http://x", &String::from("hi"), true);
        assert_eq!(request.payload().as_ref(), &[10, 2, b'h', b'i']);
        assert!(request.is_streaming());
    }
}
