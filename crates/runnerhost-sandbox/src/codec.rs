//! JSON codec for values crossing the host/guest boundary.
//!
//! Decoding failures keep the path of the offending field (`chapters[3].number`)
//! so the UI can show users exactly which part of a runner's answer was wrong.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, SandboxError};

/// Serialize `value` to JSON text.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| SandboxError::Unrepresentable {
        path: format!("$ ({e})"),
    })
}

/// Parse JSON text into `T`.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    let mut de = serde_json::Deserializer::from_str(text);
    let value = serde_path_to_error::deserialize(&mut de).map_err(path_error)?;
    de.end().map_err(|e| SandboxError::DecodeFailed {
        path: "$".into(),
        reason: e.to_string(),
    })?;
    Ok(value)
}

/// Decode an already-parsed JSON value into `T`.
pub fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_path_to_error::deserialize(value).map_err(path_error)
}

/// Turn an argument tuple into the positional list handed to a guest method.
///
/// `()` yields no arguments; a tuple or slice yields one entry per element;
/// any other value is passed as the single argument.
pub fn encode_args<A: Serialize + ?Sized>(args: &A) -> Result<Vec<Value>> {
    let value = serde_json::to_value(args).map_err(|e| SandboxError::Unrepresentable {
        path: format!("args ({e})"),
    })?;
    Ok(match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    })
}

fn path_error<E: std::fmt::Display>(err: serde_path_to_error::Error<E>) -> SandboxError {
    let path = err.path().to_string();
    SandboxError::DecodeFailed {
        path: if path == "." { "$".into() } else { path },
        reason: err.inner().to_string(),
    }
}
