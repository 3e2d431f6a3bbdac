//! Sandbox error types.
//!
//! [`SandboxError`] is the closed, host-facing taxonomy every public API in
//! this crate returns. The guest-originated kinds (`NetworkError`,
//! `CloudflareProtected`, `Named`) are only ever produced by
//! [`crate::translate`].

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// A boot script failed to evaluate or no runner object was exported.
    #[error("bootstrap failed: {reason}")]
    BootstrapFailed { reason: String },

    /// The runner matches no known environment and cannot be used.
    #[error("runner `{runner_id}` implements no known environment")]
    ClassificationFailed { runner_id: String },

    #[error("method `{method}` not found on runner")]
    MethodNotFound { method: String },

    /// The runner's intents say the capability is absent; nothing was called.
    #[error("`{method}` is not implemented (capability {capability} absent)")]
    MethodNotImplemented { method: String, capability: String },

    #[error("decode failed at `{path}`: {reason}")]
    DecodeFailed { path: String, reason: String },

    #[error("invalid key/value pair for key `{key}`")]
    InvalidKeyValuePair { key: String },

    /// Store miss. The store channel hands this to the guest as `null`.
    #[error("no value stored for key `{key}`")]
    ValueNotFound { key: String },

    #[error("network error: {message}")]
    NetworkError {
        message: String,
        body: Option<String>,
    },

    #[error("cloudflare protection encountered")]
    CloudflareProtected { resolution_url: Option<String> },

    #[error("{name}: {message}")]
    Named { name: String, message: String },

    /// A value cannot cross the boundary as JSON (function, symbol, bigint).
    #[error("value at `{path}` is not representable as JSON")]
    Unrepresentable { path: String },

    /// A reverse-channel message was malformed.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("runner `{runner_id}` is already loaded")]
    AlreadyLoaded { runner_id: String },

    #[error("runner `{runner_id}` is not loaded")]
    RunnerNotLoaded { runner_id: String },

    /// The sandbox execution lane is gone (unloaded or crashed).
    #[error("sandbox is closed")]
    SandboxClosed,

    #[error("persistence error: {0}")]
    Persistence(String),

    /// The script engine itself failed (allocation, runtime setup).
    #[error("script engine error: {0}")]
    Engine(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

impl From<runnerhost_store::StoreError> for SandboxError {
    fn from(err: runnerhost_store::StoreError) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<runnerhost_vault::VaultError> for SandboxError {
    fn from(err: runnerhost_vault::VaultError) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SandboxError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Persistence(format!("blocking task failed: {err}"))
    }
}

/// An error as the guest sees it: a named error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuestFault {
    pub name: String,
    pub message: String,
    /// Extra enumerable fields copied onto the guest error object.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GuestFault {
    fn new(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            message,
            extra: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl SandboxError {
    /// Render this error as the rejection a guest promise receives.
    pub fn guest_fault(&self) -> GuestFault {
        let message = self.to_string();
        match self {
            Self::NetworkError { message, body } => {
                let fault = GuestFault::new("NetworkError", message.clone());
                match body {
                    Some(body) => fault.with("response", serde_json::json!({ "body": body })),
                    None => fault,
                }
            }
            Self::CloudflareProtected { resolution_url } => {
                let fault = GuestFault::new("CloudflareError", message);
                match resolution_url {
                    Some(url) => fault.with("resolutionURL", url.clone()),
                    None => fault,
                }
            }
            Self::Named { name, message } => GuestFault::new(name, message.clone()),
            Self::InvalidKeyValuePair { key } => {
                GuestFault::new("InvalidKeyValuePair", message).with("key", key.clone())
            }
            Self::Unrepresentable { path } => {
                GuestFault::new("UnrepresentableValue", message).with("path", path.clone())
            }
            Self::InvalidRequest { .. } | Self::DecodeFailed { .. } => {
                GuestFault::new("InvalidRequest", message)
            }
            _ => GuestFault::new("RunnerHostError", message),
        }
    }

    /// Short kind label for logs and the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BootstrapFailed { .. } => "bootstrap_failed",
            Self::ClassificationFailed { .. } => "classification_failed",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::MethodNotImplemented { .. } => "method_not_implemented",
            Self::DecodeFailed { .. } => "decode_failed",
            Self::InvalidKeyValuePair { .. } => "invalid_key_value_pair",
            Self::ValueNotFound { .. } => "value_not_found",
            Self::NetworkError { .. } => "network_error",
            Self::CloudflareProtected { .. } => "cloudflare_protected",
            Self::Named { .. } => "named",
            Self::Unrepresentable { .. } => "unrepresentable",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::AlreadyLoaded { .. } => "already_loaded",
            Self::RunnerNotLoaded { .. } => "runner_not_loaded",
            Self::SandboxClosed => "sandbox_closed",
            Self::Persistence(_) => "persistence",
            Self::Engine(_) => "engine",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = SandboxError::DecodeFailed {
            path: "chapters[2].number".into(),
            reason: "invalid type: string, expected f64".into(),
        };
        assert_eq!(
            err.to_string(),
            "decode failed at `chapters[2].number`: invalid type: string, expected f64"
        );
        assert_eq!(
            SandboxError::Named {
                name: "Boom".into(),
                message: "oops".into()
            }
            .to_string(),
            "Boom: oops"
        );
    }

    #[test]
    fn network_fault_keeps_body_under_response() {
        let fault = SandboxError::NetworkError {
            message: "connection reset".into(),
            body: Some("<html>".into()),
        }
        .guest_fault();
        assert_eq!(fault.name, "NetworkError");
        assert_eq!(fault.message, "connection reset");
        assert_eq!(fault.to_json()["response"]["body"], "<html>");
    }

    #[test]
    fn cloudflare_fault_uses_guest_field_name() {
        let fault = SandboxError::CloudflareProtected {
            resolution_url: Some("https://x".into()),
        }
        .guest_fault();
        assert_eq!(fault.name, "CloudflareError");
        assert_eq!(fault.to_json()["resolutionURL"], "https://x");
    }

    #[test]
    fn operational_errors_get_generic_name() {
        let fault = SandboxError::Persistence("disk full".into()).guest_fault();
        assert_eq!(fault.name, "RunnerHostError");
        assert!(fault.message.contains("disk full"));
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(SandboxError::SandboxClosed.kind(), "sandbox_closed");
        assert_eq!(
            SandboxError::ValueNotFound { key: "k".into() }.kind(),
            "value_not_found"
        );
    }
}
