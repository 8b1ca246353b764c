//! Twirp error payload parsing.
//!
//! Twirp servers report errors as a JSON object, both in the body of a
//! non-success response and in the trailer frame of a streaming response:
//!
//! ```json
//! {"code": "not_found", "msg": "hat not found", "meta": {"size": "12"}}
//! ```
//!
//! [`parse_error_payload`] turns such a blob into a [`CallError`] and never
//! fails: anything it cannot decode becomes an `internal` error that keeps
//! the raw text under the `rawErr` metadata key.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CallError, Code};

/// Metadata key holding the undecodable payload.
pub const RAW_ERROR_META_KEY: &str = "rawErr";

/// Wire shape of a Twirp error.
///
/// Serializes directly. Decoding goes through [`TwirpErrorPayload::parse`],
/// which coerces non-string values instead of rejecting them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TwirpErrorPayload {
    pub code: String,
    pub msg: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

/// Why an error payload could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The blob is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The blob is JSON but not an object.
    #[error("expected a JSON object")]
    NotAnObject,

    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
}

impl TwirpErrorPayload {
    /// Parse an error payload.
    ///
    /// `code` and `msg` are required. Non-string values are kept as their
    /// JSON text, so `{"code": 404}` yields the code `"404"`. A `meta` field
    /// that is absent or not an object yields empty metadata.
    pub fn parse(raw: &[u8]) -> Result<Self, PayloadError> {
        let value: Value = serde_json::from_slice(raw)?;
        let Value::Object(object) = value else {
            return Err(PayloadError::NotAnObject);
        };

        let code = required_field(&object, "code")?;
        let msg = required_field(&object, "msg")?;
        let meta = match object.get("meta") {
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(key, value)| (key.clone(), coerce_to_string(value)))
                .collect(),
            _ => BTreeMap::new(),
        };

        Ok(Self { code, msg, meta })
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn required_field(
    object: &Map<String, Value>,
    name: &'static str,
) -> Result<String, PayloadError> {
    object
        .get(name)
        .map(coerce_to_string)
        .ok_or(PayloadError::MissingField(name))
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl From<TwirpErrorPayload> for CallError {
    fn from(payload: TwirpErrorPayload) -> Self {
        CallError::from_parts(payload.code, payload.msg, payload.meta)
    }
}

impl From<&CallError> for TwirpErrorPayload {
    fn from(err: &CallError) -> Self {
        Self {
            code: err.code().to_string(),
            msg: err.message().to_string(),
            meta: err.metadata().clone(),
        }
    }
}

impl CallError {
    /// Convert to the wire shape, e.g. for a server writing a trailer.
    pub fn to_payload(&self) -> TwirpErrorPayload {
        self.into()
    }
}

/// Parse an error payload into a [`CallError`].
///
/// This is total: when the payload cannot be decoded the result is an
/// `internal` error whose message starts with `Unable to decode error: ` and
/// whose metadata holds the original text under [`RAW_ERROR_META_KEY`].
pub fn parse_error_payload(raw: &[u8]) -> CallError {
    match TwirpErrorPayload::parse(raw) {
        Ok(payload) => payload.into(),
        Err(err) => CallError::new(Code::Internal, format!("Unable to decode error: {err}"))
            .with_meta(RAW_ERROR_META_KEY, String::from_utf8_lossy(raw)),
    }
}
