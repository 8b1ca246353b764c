//! Client builder.
//!
//! Provides a fluent API for configuring and building a [`TwirpClient`].

use http::Uri;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use twirp_stream_core::CallError;

use crate::client::TwirpClient;
use crate::transport::HyperTransport;

/// Default path prefix of Twirp routes.
pub const DEFAULT_PATH_PREFIX: &str = "/twirp";

/// Builder for creating a [`TwirpClient`].
///
/// # Example
///
/// ```ignore
/// use twirp_stream_client::ClientBuilder;
///
/// let client = ClientBuilder::new("http://localhost:8080")
///     .header(HeaderName::from_static("x-api-key"), HeaderValue::from_static("secret"))
///     .build()?;
/// ```
pub struct ClientBuilder {
    /// Base URL for the service (e.g., "http://localhost:8080").
    base_url: String,
    /// Path prefix between the base URL and the procedure.
    path_prefix: String,
    /// Headers sent with every call.
    headers: HeaderMap,
    /// Optional pre-configured transport.
    transport: Option<HyperTransport>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("path_prefix", &self.path_prefix)
            .field("headers", &self.headers.len())
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

impl ClientBuilder {
    /// Create a new ClientBuilder with the given base URL.
    ///
    /// The base URL must include the scheme and host, e.g.
    /// "http://localhost:8080". A trailing slash is ignored.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            headers: HeaderMap::new(),
            transport: None,
        }
    }

    /// Set the route prefix.
    ///
    /// Default: `/twirp`. Pass an empty string for servers mounted at the root.
    pub fn path_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    /// Add a header sent with every call.
    ///
    /// `Content-Type` is always `application/protobuf` and cannot be
    /// overridden here.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Use a pre-configured transport.
    ///
    /// Clients built with clones of one transport share its connection pool.
    pub fn transport(mut self, transport: HyperTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<TwirpClient, ClientBuildError> {
        let base_url = self.base_url.trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => HyperTransport::new().map_err(ClientBuildError::Transport)?,
        };

        Ok(TwirpClient::from_parts(
            transport,
            base_url,
            normalize_prefix(&self.path_prefix),
            self.headers,
        ))
    }
}

fn validate_base_url(url: &str) -> Result<(), ClientBuildError> {
    let invalid = |reason: &str| ClientBuildError::InvalidBaseUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
    if uri.scheme().is_none() {
        return Err(invalid("missing scheme"));
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}

/// `twirp`, `/twirp/` and `/twirp` all become `/twirp`; empty stays empty.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Error building a [`TwirpClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    /// The base URL is not an absolute URL.
    #[error("invalid base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The default transport could not be created.
    #[error("failed to create HTTP transport: {0}")]
    Transport(#[source] CallError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new("http://localhost:8080");
        assert_eq!(builder.base_url, "http://localhost:8080");
        assert_eq!(builder.path_prefix, "/twirp");
        assert!(builder.headers.is_empty());
        assert!(builder.transport.is_none());
    }

    #[test]
    fn test_builder_headers() {
        let builder = ClientBuilder::new("http://localhost:8080")
            .header(HeaderName::from_static("x-a"), HeaderValue::from_static("1"))
            .header(HeaderName::from_static("x-a"), HeaderValue::from_static("2"));
        assert_eq!(builder.headers.get_all("x-a").iter().count(), 2);
    }

    #[test]
    fn test_validate_base_url() {
        assert!(validate_base_url("http://localhost:8080").is_ok());
        assert!(validate_base_url("https://api.example.com/prefix").is_ok());

        let err = validate_base_url("localhost").unwrap_err();
        assert!(matches!(err, ClientBuildError::InvalidBaseUrl { .. }));
        assert!(validate_base_url("not a url").is_err());
        assert!(validate_base_url("").is_err());
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("/twirp"), "/twirp");
        assert_eq!(normalize_prefix("twirp/"), "/twirp");
        assert_eq!(normalize_prefix("/api/twirp/"), "/api/twirp");
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("/"), "");
    }

    #[test]
    fn test_build_rejects_relative_url() {
        let err = ClientBuilder::new("/relative").build().unwrap_err();
        assert!(err.to_string().starts_with("invalid base URL `/relative`"));
    }
}
