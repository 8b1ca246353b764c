//! Response types for the Twirp client.
//!
//! This module provides the [`TwirpResponse`] type which wraps call results
//! along with metadata (headers) from the server, and the streaming body
//! decoder.

mod decoder;

pub use decoder::{DecoderState, StreamDecoder};

use http::HeaderMap;
use std::ops::Deref;

/// Response wrapper for Twirp client calls.
///
/// Contains the response value (a message, or a stream of them) and the HTTP
/// headers of the server response.
///
/// # Example
///
/// ```ignore
/// let response = client.call_unary::<Size, Hat>("twitch.twirp.example.Haberdasher/MakeHat", &size).await?;
///
/// // Access the response directly via Deref
/// println!("Color: {}", response.color);
///
/// // Access response metadata (headers)
/// if let Some(value) = response.metadata().get("x-request-id") {
///     println!("Request id: {value}");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TwirpResponse<T> {
    /// The response value.
    inner: T,
    /// Response metadata (HTTP headers).
    metadata: Metadata,
}

impl<T> TwirpResponse<T> {
    /// Create a new TwirpResponse with the given value and metadata.
    pub fn new(inner: T, metadata: Metadata) -> Self {
        Self { inner, metadata }
    }

    /// Extract the inner value, discarding metadata.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Get a reference to the response metadata.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Transform the inner value, preserving metadata.
    pub fn map<U, F>(self, f: F) -> TwirpResponse<U>
    where
        F: FnOnce(T) -> U,
    {
        TwirpResponse {
            inner: f(self.inner),
            metadata: self.metadata,
        }
    }

    /// Get a reference to the inner value.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Get a mutable reference to the inner value.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Decompose into inner value and metadata.
    pub fn into_parts(self) -> (T, Metadata) {
        (self.inner, self.metadata)
    }
}

impl<T> Deref for TwirpResponse<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Response metadata wrapper around HTTP headers.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    /// Create new metadata from HTTP headers.
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Get a header value by name.
    ///
    /// Returns `None` if the header is not present or is not valid text.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Check if a header exists.
    pub fn contains(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    /// Get all values for a header.
    pub fn get_all(&self, key: &str) -> impl Iterator<Item = &str> {
        self.headers
            .get_all(key)
            .iter()
            .filter_map(|v| v.to_str().ok())
    }

    /// Get the underlying HeaderMap.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Consume self and return the underlying HeaderMap.
    pub fn into_headers(self) -> HeaderMap {
        self.headers
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl From<HeaderMap> for Metadata {
    fn from(headers: HeaderMap) -> Self {
        Self::new(headers)
    }
}
