//! Wire envelopes exchanged with automation clients.
//!
//! A request is a single JSON object naming the command in `type` and carrying
//! its arguments in `parameters`:
//!
//! ```json
//! {"type":"scene.CreateObject","parameters":{"name":"Cube"}}
//! ```
//!
//! The bridge answers with exactly one response object. Success carries the
//! handler's result verbatim; failure carries a human-readable message:
//!
//! ```json
//! {"status":"success","result":{"id":42}}
//! {"status":"error","message":"Unknown subsystem: scene"}
//! ```
//!
//! The codec validates structure only. Whether a command exists is decided by
//! the registry at dispatch time.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Subsystem assumed when a command type carries no `subsystem.` prefix.
pub const DEFAULT_SUBSYSTEM: &str = "core";

const ENCODE_FALLBACK: &[u8] =
    b"{\"status\":\"error\",\"message\":\"failed to encode response\"}\n";

/// Errors raised while decoding a request payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload carried no usable `type` field (this includes empty bodies).
    #[error("Command type is required")]
    MissingType,
    /// The `type` field was present but not a string.
    #[error("Command type must be a string")]
    InvalidType,
    /// The payload was not valid JSON.
    #[error("Invalid JSON: {source}")]
    InvalidJson {
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// The payload was valid JSON but not an object.
    #[error("Request must be a JSON object")]
    NotAnObject,
    /// `parameters` was present but not an object.
    #[error("Command parameters must be a JSON object")]
    InvalidParameters,
    /// The request body exceeded the configured read buffer.
    #[error("Request exceeds the {max_size} byte limit")]
    RequestTooLarge {
        /// Configured ceiling in bytes.
        max_size: usize,
    },
}

/// A decoded request: command identifier plus parameter payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    identifier: String,
    parameters: Value,
}

impl CommandEnvelope {
    /// Builds an envelope directly, bypassing wire decoding.
    ///
    /// A `Value::Null` parameter payload is replaced with an empty object so
    /// handlers always see a mapping.
    #[must_use]
    pub fn new(identifier: impl Into<String>, payload: Value) -> Self {
        let parameters = match payload {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self {
            identifier: identifier.into(),
            parameters,
        }
    }

    /// Decodes a raw request body.
    ///
    /// Surrounding whitespace is ignored. An empty body is reported as a
    /// missing command type, matching what clients see for `{}`.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the body is not a JSON object with a
    /// non-empty string `type` and an optional object `parameters`.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let trimmed = bytes.trim_ascii();
        if trimmed.is_empty() {
            return Err(DecodeError::MissingType);
        }
        let value: Value = serde_json::from_slice(trimmed)
            .map_err(|source| DecodeError::InvalidJson { source })?;
        Self::from_value(value)
    }

    /// Builds an envelope from an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] under the same structural rules as
    /// [`CommandEnvelope::decode`].
    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let Value::Object(mut object) = value else {
            return Err(DecodeError::NotAnObject);
        };

        let identifier = match object.remove("type") {
            None | Some(Value::Null) => return Err(DecodeError::MissingType),
            Some(Value::String(text)) => text.trim().to_owned(),
            Some(_) => return Err(DecodeError::InvalidType),
        };
        if identifier.is_empty() {
            return Err(DecodeError::MissingType);
        }

        let parameters = match object.remove("parameters") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(value @ Value::Object(_)) => value,
            Some(_) => return Err(DecodeError::InvalidParameters),
        };

        Ok(Self {
            identifier,
            parameters,
        })
    }

    /// Encodes the envelope in wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let wire = serde_json::json!({
            "type": self.identifier,
            "parameters": self.parameters,
        });
        serde_json::to_vec(&wire).unwrap_or_default()
    }

    /// Raw command identifier as sent by the client.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Parameter payload.
    #[must_use]
    pub const fn parameters(&self) -> &Value {
        &self.parameters
    }

    /// Splits the envelope into its identifier and parameters.
    #[must_use]
    pub fn into_parts(self) -> (String, Value) {
        (self.identifier, self.parameters)
    }
}

/// Outcome returned to the client for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseEnvelope {
    /// The command ran and produced `result`.
    Success {
        /// Handler result, passed through verbatim.
        result: Value,
    },
    /// The command failed before or during execution.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

impl ResponseEnvelope {
    /// Creates a success envelope.
    #[must_use]
    pub const fn success(result: Value) -> Self {
        Self::Success { result }
    }

    /// Creates an error envelope.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns true for error envelopes.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Encodes the envelope as a single newline-terminated JSON line.
    ///
    /// Encoding cannot fail for envelopes built from `serde_json::Value`; a
    /// fixed error envelope is written if it ever does.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match serde_json::to_vec(self) {
            Ok(mut bytes) => {
                bytes.push(b'\n');
                bytes
            }
            Err(_) => ENCODE_FALLBACK.to_vec(),
        }
    }

    /// Decodes a response body, as a client would.
    ///
    /// # Errors
    ///
    /// Returns the parser error when the body is not a response envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes.trim_ascii())
    }
}

impl From<&DecodeError> for ResponseEnvelope {
    fn from(error: &DecodeError) -> Self {
        Self::error(error.to_string())
    }
}

impl fmt::Display for ResponseEnvelope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { result } => write!(formatter, "success: {result}"),
            Self::Error { message } => write!(formatter, "error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "tests fail loudly on setup errors")]

    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn decodes_qualified_command() {
        let envelope =
            CommandEnvelope::decode(br#"{"type":"scene.Create","parameters":{"name":"Cube"}}"#)
                .expect("decode request");
        assert_eq!(envelope.identifier(), "scene.Create");
        assert_eq!(envelope.parameters(), &json!({"name": "Cube"}));
    }

    #[test]
    fn parameters_default_to_empty_mapping() {
        let envelope = CommandEnvelope::decode(br#"{"type":"Ping"}"#).expect("decode request");
        assert_eq!(envelope.parameters(), &json!({}));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let envelope =
            CommandEnvelope::decode(b"  {\"type\":\" core.Ping \"}\r\n").expect("decode request");
        assert_eq!(envelope.identifier(), "core.Ping");
    }

    #[rstest]
    #[case::empty(b"".as_slice())]
    #[case::whitespace(b" \n ".as_slice())]
    #[case::no_type(br#"{"parameters":{}}"#.as_slice())]
    #[case::null_type(br#"{"type":null}"#.as_slice())]
    #[case::blank_type(br#"{"type":"   "}"#.as_slice())]
    fn missing_type_is_reported(#[case] body: &[u8]) {
        let error = CommandEnvelope::decode(body).expect_err("decode must fail");
        assert!(matches!(error, DecodeError::MissingType));
        assert_eq!(error.to_string(), "Command type is required");
    }

    #[rstest]
    #[case::text(b"not json".as_slice())]
    #[case::truncated(br#"{"type":"core.Ping""#.as_slice())]
    #[case::invalid_utf8(b"{\"type\":\"\xff\"}".as_slice())]
    fn malformed_json_is_reported(#[case] body: &[u8]) {
        let error = CommandEnvelope::decode(body).expect_err("decode must fail");
        assert!(matches!(error, DecodeError::InvalidJson { .. }));
        assert!(error.to_string().starts_with("Invalid JSON"));
    }

    #[rstest]
    #[case::array(br#"["core.Ping"]"#.as_slice())]
    #[case::string(br#""core.Ping""#.as_slice())]
    fn non_object_payload_is_rejected(#[case] body: &[u8]) {
        let error = CommandEnvelope::decode(body).expect_err("decode must fail");
        assert!(matches!(error, DecodeError::NotAnObject));
    }

    #[test]
    fn numeric_type_is_rejected() {
        let error = CommandEnvelope::decode(br#"{"type":7}"#).expect_err("decode must fail");
        assert!(matches!(error, DecodeError::InvalidType));
    }

    #[test]
    fn non_object_parameters_are_rejected() {
        let error = CommandEnvelope::decode(br#"{"type":"core.Ping","parameters":[1,2]}"#)
            .expect_err("decode must fail");
        assert!(matches!(error, DecodeError::InvalidParameters));
    }

    #[test]
    fn encodes_success_envelope() {
        let bytes = ResponseEnvelope::success(json!({"version": "1.0.0"})).encode();
        let text = String::from_utf8(bytes).expect("utf8");
        assert_eq!(
            text,
            "{\"status\":\"success\",\"result\":{\"version\":\"1.0.0\"}}\n"
        );
    }

    #[test]
    fn encodes_error_envelope_without_result() {
        let bytes = ResponseEnvelope::error("boom").encode();
        let value: Value = serde_json::from_slice(&bytes).expect("valid json");
        assert_eq!(value, json!({"status": "error", "message": "boom"}));
    }

    #[test]
    fn decode_errors_convert_to_error_envelopes() {
        let response = ResponseEnvelope::from(&DecodeError::MissingType);
        assert_eq!(response, ResponseEnvelope::error("Command type is required"));
    }

    #[test]
    fn response_decodes_from_wire_form() {
        let response =
            ResponseEnvelope::decode(b"{\"status\":\"success\",\"result\":null}\n").expect("decode");
        assert_eq!(response, ResponseEnvelope::success(Value::Null));
    }

    #[test]
    fn null_parameters_normalise_to_mapping() {
        let envelope = CommandEnvelope::new("core.Ping", Value::Null);
        assert_eq!(envelope.parameters(), &json!({}));
    }
}
