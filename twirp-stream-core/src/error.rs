//! Twirp error codes and the unified call error.
//!
//! This module provides:
//! - [`Code`]: The well-known Twirp error codes
//! - [`CallError`]: The error value surfaced for every failure of a call

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Code carried by the end-of-stream sentinel.
pub const EOF_CODE: &str = "EOF";

/// Message carried by the end-of-stream sentinel.
pub const EOF_MESSAGE: &str = "End of stream";

/// Twirp error codes, matching the codes defined by the Twirp protocol.
///
/// [`CallError`] stores its code as a string so that application-defined
/// codes pass through untouched; use [`CallError::code_kind`] to map a code
/// back onto this enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Canceled,
    Unknown,
    InvalidArgument,
    Malformed,
    DeadlineExceeded,
    NotFound,
    BadRoute,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
}

impl Code {
    /// Get the string representation of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Canceled => "canceled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid_argument",
            Code::Malformed => "malformed",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::NotFound => "not_found",
            Code::BadRoute => "bad_route",
            Code::AlreadyExists => "already_exists",
            Code::PermissionDenied => "permission_denied",
            Code::Unauthenticated => "unauthenticated",
            Code::ResourceExhausted => "resource_exhausted",
            Code::FailedPrecondition => "failed_precondition",
            Code::Aborted => "aborted",
            Code::OutOfRange => "out_of_range",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::DataLoss => "data_loss",
        }
    }

    /// HTTP status a Twirp server responds with for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            Code::Canceled | Code::DeadlineExceeded => 408,
            Code::InvalidArgument | Code::Malformed | Code::OutOfRange => 400,
            Code::NotFound | Code::BadRoute => 404,
            Code::AlreadyExists | Code::Aborted => 409,
            Code::PermissionDenied => 403,
            Code::Unauthenticated => 401,
            Code::ResourceExhausted => 429,
            Code::FailedPrecondition => 412,
            Code::Unimplemented => 501,
            Code::Unavailable => 503,
            Code::Unknown | Code::Internal | Code::DataLoss => 500,
        }
    }

    /// Returns whether this error code indicates a transient condition that may
    /// be resolved by retrying.
    ///
    /// Nothing in this crate retries on its own; this is a hint for callers
    /// that implement their own retry policy.
    ///
    /// # Example
    ///
    /// ```
    /// use twirp_stream_core::Code;
    ///
    /// assert!(Code::Unavailable.is_retryable());
    /// assert!(!Code::NotFound.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Code::Unavailable | Code::ResourceExhausted | Code::Aborted
        )
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        code.as_str().to_string()
    }
}

/// Error returned when parsing a [`Code`] from a string fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseCodeError(());

impl fmt::Display for ParseCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown error code")
    }
}

impl std::error::Error for ParseCodeError {}

impl FromStr for Code {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "canceled" | "cancelled" => Ok(Code::Canceled),
            "unknown" => Ok(Code::Unknown),
            "invalid_argument" => Ok(Code::InvalidArgument),
            "malformed" => Ok(Code::Malformed),
            "deadline_exceeded" => Ok(Code::DeadlineExceeded),
            "not_found" => Ok(Code::NotFound),
            "bad_route" => Ok(Code::BadRoute),
            "already_exists" => Ok(Code::AlreadyExists),
            "permission_denied" => Ok(Code::PermissionDenied),
            "unauthenticated" => Ok(Code::Unauthenticated),
            "resource_exhausted" => Ok(Code::ResourceExhausted),
            "failed_precondition" => Ok(Code::FailedPrecondition),
            "aborted" => Ok(Code::Aborted),
            "out_of_range" => Ok(Code::OutOfRange),
            "unimplemented" => Ok(Code::Unimplemented),
            "internal" => Ok(Code::Internal),
            "unavailable" => Ok(Code::Unavailable),
            "data_loss" => Ok(Code::DataLoss),
            _ => Err(ParseCodeError(())),
        }
    }
}

/// The error value surfaced for every failure of a call.
///
/// Transport failures, non-success HTTP responses, malformed frames and
/// errors sent by the server in a trailer all end up in this one shape:
/// a machine-readable `code`, a human `message` and string metadata.
///
/// The code is never empty (it falls back to `internal`) and the metadata
/// map is always present, possibly empty.
///
/// # Example
///
/// ```
/// use twirp_stream_core::{CallError, Code};
///
/// let err = CallError::new(Code::NotFound, "hat not found").with_meta("size", "12");
/// assert_eq!(err.code(), "not_found");
/// assert_eq!(err.to_string(), "hat not found (not_found) {size=12}");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({code}){}", render_metadata(.metadata))]
pub struct CallError {
    code: String,
    message: String,
    metadata: BTreeMap<String, String>,
}

impl CallError {
    /// Create an error from a code and a message, with empty metadata.
    pub fn new<C, M>(code: C, message: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self::from_parts(code, message, BTreeMap::new())
    }

    /// Create an error from all three fields.
    pub fn from_parts<C, M>(code: C, message: M, metadata: BTreeMap<String, String>) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        let mut code = code.into();
        if code.is_empty() {
            code = Code::Internal.into();
        }
        Self {
            code,
            message: message.into(),
            metadata,
        }
    }

    /// Create an `internal` error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Wrap a lower-level failure.
    ///
    /// The result has code `internal`, the given message, and the failure's
    /// description (including its source chain) under the `cause` key.
    pub fn with_cause<M, E>(message: M, cause: &E) -> Self
    where
        M: Into<String>,
        E: std::error::Error + ?Sized,
    {
        Self::internal(message).with_meta("cause", describe(cause))
    }

    /// The end-of-stream sentinel.
    ///
    /// Marks clean termination of a streaming response; it is never handed
    /// to a consumer as an error.
    pub fn eof() -> Self {
        Self::new(EOF_CODE, EOF_MESSAGE)
    }

    /// Returns true if this is the end-of-stream sentinel.
    pub fn is_eof(&self) -> bool {
        self.code == EOF_CODE
    }

    /// Add a metadata entry, replacing any previous value for `key`.
    pub fn with_meta<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get the error code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Get the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error metadata.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Get a single metadata value.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Map the code onto a well-known [`Code`], if it is one.
    pub fn code_kind(&self) -> Option<Code> {
        self.code.parse().ok()
    }

    /// Returns whether the code is one of the transient [`Code`]s.
    ///
    /// Application-defined codes are never considered retryable.
    pub fn is_retryable(&self) -> bool {
        self.code_kind().is_some_and(|code| code.is_retryable())
    }

    /// Decompose into `(code, message, metadata)`.
    pub fn into_parts(self) -> (String, String, BTreeMap<String, String>) {
        (self.code, self.message, self.metadata)
    }
}

fn render_metadata(metadata: &BTreeMap<String, String>) -> String {
    if metadata.is_empty() {
        return String::new();
    }
    let entries: Vec<String> = metadata.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!(" {{{}}}", entries.join(", "))
}

/// Describe an error together with its sources.
///
/// Sources whose text is already part of the description are skipped, since
/// many error types repeat their source in their own `Display`.
/// Display text of `err` followed by each distinct source in its chain.
pub(crate) fn describe<E: std::error::Error + ?Sized>(err: &E) -> String {
    let mut description = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !description.contains(&text) {
            description.push_str(": ");
            description.push_str(&text);
        }
        source = cause.source();
    }
    description
}
