//! Sandbox configuration.
//!
//! [`SandboxConfig`] holds the engine limits and the network defaults
//! applied to every runner sandbox. Defaults come from [`Default`]; hosts
//! override fields with the `with_*` builder methods or deserialize the
//! `[sandbox]` table of their config file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Which sandbox backend hosts new runners.
    pub backend: BackendKind,

    /// Heap limit of one script engine, in bytes. Default: 64 MiB.
    pub memory_limit: usize,

    /// Script engine stack limit, in bytes. Default: 1 MiB.
    pub max_stack_size: usize,

    /// Network timeout when the guest request names none. Default: 30 s.
    pub request_timeout_ms: u64,

    /// Response bodies beyond this many bytes are cut off. Default: 8 MiB.
    pub max_response_bytes: usize,

    pub user_agent: String,

    /// Replaces the embedded commons library when set.
    pub commons_path: Option<PathBuf>,

    /// File extension of runner scripts in a runners directory.
    pub script_extension: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::InProcess,
            memory_limit: 64 * 1024 * 1024,
            max_stack_size: 1024 * 1024,
            request_timeout_ms: 30_000,
            max_response_bytes: 8 * 1024 * 1024,
            user_agent: concat!("RunnerHost/", env!("CARGO_PKG_VERSION")).to_string(),
            commons_path: None,
            script_extension: "js".to_string(),
        }
    }
}

impl SandboxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = bytes;
        self
    }

    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }

    pub fn with_max_response_bytes(mut self, bytes: usize) -> Self {
        self.max_response_bytes = bytes;
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn with_commons_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.commons_path = Some(path.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = SandboxConfig::default();
        assert_eq!(cfg.backend, BackendKind::InProcess);
        assert_eq!(cfg.memory_limit, 64 * 1024 * 1024);
        assert_eq!(cfg.max_stack_size, 1024 * 1024);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.script_extension, "js");
        assert!(cfg.user_agent.starts_with("RunnerHost/"));
        assert!(cfg.commons_path.is_none());
    }

    #[test]
    fn builder_chaining() {
        let cfg = SandboxConfig::new()
            .with_backend(BackendKind::Isolated)
            .with_memory_limit(8 * 1024 * 1024)
            .with_request_timeout_ms(500)
            .with_commons_path("/tmp/commons.js");
        assert_eq!(cfg.backend, BackendKind::Isolated);
        assert_eq!(cfg.memory_limit, 8 * 1024 * 1024);
        assert_eq!(cfg.request_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.commons_path, Some(PathBuf::from("/tmp/commons.js")));
    }

    #[test]
    fn partial_table_keeps_defaults() {
        let cfg: SandboxConfig =
            serde_json::from_value(serde_json::json!({ "backend": "isolated", "request_timeout_ms": 1000 }))
                .unwrap();
        assert_eq!(cfg.backend, BackendKind::Isolated);
        assert_eq!(cfg.request_timeout_ms, 1000);
        assert_eq!(cfg.max_response_bytes, 8 * 1024 * 1024);
    }
}
