//! Store channel: `{store, action, key, value?}` against the runner's namespace.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{HostServices, invalid_request};
use crate::codec;
use crate::error::{Result, SandboxError};
use crate::persistence::KeyValueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Object,
    Secure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreAction {
    Get,
    Set,
    Remove,
}

#[derive(Debug, Deserialize)]
pub struct StoreMessage {
    pub store: StoreKind,
    pub action: StoreAction,
    pub key: String,
    /// Explicit `null` counts as absent.
    #[serde(default)]
    pub value: Option<Value>,
}

/// `get` answers the decoded value or [`SandboxError::ValueNotFound`];
/// `set` and `remove` answer `null`.
pub async fn handle(services: &HostServices, payload: Value) -> Result<Value> {
    let message: StoreMessage = codec::decode_value(payload).map_err(invalid_request)?;
    if message.key.is_empty() {
        return Err(SandboxError::InvalidKeyValuePair { key: message.key });
    }

    let backend: &dyn KeyValueStore = match message.store {
        StoreKind::Object => services.object_store(),
        StoreKind::Secure => services.secure_store(),
    };
    let namespace = services.runner_id();
    debug!(runner = namespace, store = ?message.store, action = ?message.action, key = %message.key, "store request");

    match message.action {
        StoreAction::Get => match backend.get(namespace, &message.key).await? {
            // Rows written outside the channel may not be JSON; hand them back as text.
            Some(text) => Ok(codec::decode::<Value>(&text).unwrap_or(Value::String(text))),
            None => Err(SandboxError::ValueNotFound { key: message.key }),
        },
        StoreAction::Set => {
            let Some(value) = message.value else {
                return Err(SandboxError::InvalidKeyValuePair { key: message.key });
            };
            backend.set(namespace, &message.key, &codec::encode(&value)?).await?;
            Ok(Value::Null)
        }
        StoreAction::Remove => {
            backend.remove(namespace, &message.key).await?;
            Ok(Value::Null)
        }
    }
}
