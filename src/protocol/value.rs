//! Cache values
//!
//! The server stores opaque strings. Clients that write structured data send
//! compact JSON, so a value read back is classified once, at the codec
//! boundary, by a fixed rule: a complete JSON document is `Structured`,
//! anything else is `Raw`.

use serde::Serialize;

use crate::error::{NairError, Result};

/// A value as stored in the cache
///
/// Reading back is lossy for raw text that happens to be valid JSON:
/// `Value::Raw("42")` is written as `42` and read back as
/// `Value::Structured(42)`. `to_string()` on the value read back gives the
/// compact JSON form, which matches the written text only when that text was
/// already compact.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Plain text, written and read verbatim
    Raw(String),

    /// JSON document
    Structured(serde_json::Value),
}

impl Value {
    /// Classify text read from the wire
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(json) => Value::Structured(json),
            Err(_) => Value::Raw(text.to_owned()),
        }
    }

    /// Decode a value field. Invalid UTF-8 is a protocol violation.
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| NairError::protocol(format!("value is not valid UTF-8: {}", e)))?;
        Ok(Self::from_text(text))
    }

    /// Bytes written to the wire for this value
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        match self {
            Value::Raw(text) => Ok(text.as_bytes().to_vec()),
            Value::Structured(json) => serde_json::to_vec(json)
                .map_err(|e| NairError::encoding(format!("value is not serializable: {}", e))),
        }
    }

    /// The text of a raw value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Raw(text) => Some(text),
            Value::Structured(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Raw(_) => None,
            Value::Structured(json) => Some(json),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Raw(text) => f.write_str(text),
            Value::Structured(json) => write!(f, "{}", json),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Raw(text.to_owned())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Raw(text)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::Structured(json)
    }
}
