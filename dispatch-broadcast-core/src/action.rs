//! Action record flowing through the dispatch pipeline

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// An action dispatched to the store
///
/// Actions are loosely structured records: a `type` identifier, an optional
/// `meta` value and an optional `payload`. Any other top-level fields are
/// kept in `extra` so they survive a trip through the broadcast channel.
///
/// Actions should be cheap to clone; they may be logged, broadcast and
/// reduced in the same dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// The action identifier (serialized as `type`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional metadata, usually an object
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Optional payload; an explicit `null` is `Some(Value::Null)`
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Remaining top-level fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Action {
    /// Create an action with only a type
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            meta: None,
            payload: None,
            extra: Map::new(),
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Replace the meta value
    pub fn with_meta(mut self, meta: impl Into<Value>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    /// Set a single meta field, turning `meta` into an object if needed
    ///
    /// A non-object `meta` is discarded.
    pub fn with_meta_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut meta = match self.meta.take() {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        meta.insert(key.into(), value.into());
        self.meta = Some(Value::Object(meta));
        self
    }

    /// Get the action name for logging and filtering
    pub fn name(&self) -> &str {
        &self.kind
    }

    /// Look up a field of the `meta` object
    ///
    /// Returns `None` when `meta` is absent or not an object.
    pub fn meta_field(&self, key: &str) -> Option<&Value> {
        match &self.meta {
            Some(Value::Object(map)) => map.get(key),
            _ => None,
        }
    }

    /// One-line summary used by the action log
    pub fn summary(&self) -> String {
        match &self.payload {
            Some(payload) => format!("{} {}", self.kind, payload),
            None => self.kind.clone(),
        }
    }
}

/// A field that is present deserializes to `Some`, even when it is `null`
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Truthiness of a JSON value
///
/// `null`, `false`, numeric zero and the empty string are falsy. Everything
/// else, including empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
