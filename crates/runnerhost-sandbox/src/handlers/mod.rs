//! Host services reachable from guest code (the reverse channels).
//!
//! A [`HostServices`] value is built explicitly for one sandbox and carries
//! the runner id used to namespace every store access, so no handler ever
//! looks up "the current runner" from ambient state.

pub mod log;
pub mod network;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::{Result, SandboxError};
use crate::http::HttpClient;
use crate::persistence::{KeyValueStore, MemoryStore};

/// Reserved global names the channels are installed under.
pub const STORE_CHANNEL: &str = "__rhStore";
pub const NETWORK_CHANNEL: &str = "__rhNetwork";
pub const LOG_CHANNEL: &str = "__rhLog";

/// Channels answered asynchronously. Logging is fire-and-forget and is
/// handled inline by [`HostServices::log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseChannel {
    Store,
    Network,
}

impl ReverseChannel {
    pub fn name(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Network => "network",
        }
    }
}

#[derive(Clone)]
pub struct HostServices {
    runner_id: Arc<str>,
    object_store: Arc<dyn KeyValueStore>,
    secure_store: Arc<dyn KeyValueStore>,
    http: Arc<dyn HttpClient>,
    request_timeout: Duration,
}

impl HostServices {
    pub fn new(
        runner_id: impl Into<String>,
        object_store: Arc<dyn KeyValueStore>,
        secure_store: Arc<dyn KeyValueStore>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            runner_id: Arc::from(runner_id.into()),
            object_store,
            secure_store,
            http,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Both stores in memory; nothing survives the process.
    pub fn ephemeral(runner_id: impl Into<String>, http: Arc<dyn HttpClient>) -> Self {
        Self::new(
            runner_id,
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            http,
        )
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Same collaborators, scoped to another runner.
    pub fn for_runner(&self, runner_id: impl Into<String>) -> Self {
        Self {
            runner_id: Arc::from(runner_id.into()),
            ..self.clone()
        }
    }

    pub fn runner_id(&self) -> &str {
        &self.runner_id
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub(crate) fn object_store(&self) -> &dyn KeyValueStore {
        self.object_store.as_ref()
    }

    pub(crate) fn secure_store(&self) -> &dyn KeyValueStore {
        self.secure_store.as_ref()
    }

    pub(crate) fn http(&self) -> &dyn HttpClient {
        self.http.as_ref()
    }

    /// Answer one reverse message. A store miss becomes `null` here, so the
    /// guest sees "unset" rather than a rejection.
    pub async fn dispatch(&self, channel: ReverseChannel, payload: Value) -> Result<Value> {
        match channel {
            ReverseChannel::Store => match store::handle(self, payload).await {
                Err(SandboxError::ValueNotFound { .. }) => Ok(Value::Null),
                other => other,
            },
            ReverseChannel::Network => network::handle(self, payload).await,
        }
    }

    pub fn log(&self, payload: &Value) {
        log::handle(&self.runner_id, payload);
    }
}

/// Malformed channel payloads are reported as `InvalidRequest`.
pub(crate) fn invalid_request(err: SandboxError) -> SandboxError {
    match err {
        SandboxError::DecodeFailed { path, reason } => SandboxError::InvalidRequest {
            reason: format!("{path}: {reason}"),
        },
        other => other,
    }
}
