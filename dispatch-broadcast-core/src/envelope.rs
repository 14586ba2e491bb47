//! Wire format for actions placed on the broadcast channel
//!
//! An envelope is the JSON text of `{ "action": <action> }`. It carries no
//! sequence number, timestamp or sender identity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::Action;

/// Decoded channel envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub action: Action,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    action: &'a Action,
}

/// Failure to encode an action into an envelope
#[derive(Debug, Error)]
#[error("failed to encode envelope: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Failure to decode an envelope
///
/// Serializes as `{ "kind": ..., ... }` so it can travel as the payload of an
/// error action.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeError {
    /// The text is not valid JSON
    #[error("malformed envelope at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    /// Valid JSON without an `action` object
    #[error("envelope has no `action` field")]
    MissingAction,

    /// The `action` field does not have the shape of an action
    #[error("invalid action in envelope: {message}")]
    InvalidAction { message: String },
}

impl DecodeError {
    /// The error as a JSON value
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::String(self.to_string()))
    }
}

/// Encode `{ action }` as JSON text
pub fn encode(action: &Action) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(&EnvelopeRef { action })?)
}

/// Decode JSON text into an [`Envelope`]
///
/// # Example
/// ```
/// use dispatch_broadcast_core::envelope::{decode, DecodeError};
///
/// let envelope = decode(r#"{"action":{"type":"X"}}"#).unwrap();
/// assert_eq!(envelope.action.kind, "X");
///
/// assert_eq!(decode(r#"{"other":1}"#), Err(DecodeError::MissingAction));
/// ```
pub fn decode(text: &str) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(|e| DecodeError::Syntax {
        message: e.to_string(),
        line: e.line(),
        column: e.column(),
    })?;

    let action = match value {
        Value::Object(mut map) => map.remove("action"),
        _ => None,
    };

    let action = match action {
        Some(action @ Value::Object(_)) => action,
        Some(Value::Null) | None => return Err(DecodeError::MissingAction),
        Some(other) => {
            return Err(DecodeError::InvalidAction {
                message: format!("expected an object, found {other}"),
            })
        }
    };

    let action = serde_json::from_value(action).map_err(|e| DecodeError::InvalidAction {
        message: e.to_string(),
    })?;

    Ok(Envelope { action })
}
