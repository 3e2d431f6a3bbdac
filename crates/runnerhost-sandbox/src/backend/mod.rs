//! Sandbox backends.
//!
//! Both backends run the same boot sequence and expose the same
//! [`SandboxBackend`] surface; they differ only in how the guest reaches the
//! host. [`BackendKind::InProcess`] installs native functions in the guest
//! realm. [`BackendKind::Isolated`] exposes a single text post-message
//! primitive and correlates replies by id, as a webview bridge would.

mod inprocess;
mod isolated;
mod lane;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::handlers::HostServices;

/// Guest-side helpers (`ObjectStore`, `NetworkClient`, error classes).
pub const COMMONS_JS: &str = include_str!("../../assets/commons.js");

/// Resolves the runner export and installs the host entry points.
pub const BOOTSTRAP_JS: &str = include_str!("../../assets/bootstrap.js");

/// Channel functions for the isolated backend, built on `__rhPost`.
pub(crate) const SHIMS_JS: &str = include_str!("../../assets/shims.js");

/// Global the resolved runner object is bound to.
pub const RUNNER_GLOBAL: &str = "__RUNNER__";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    InProcess,
    Isolated,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProcess => "in_process",
            Self::Isolated => "isolated",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "in_process" | "inprocess" => Some(Self::InProcess),
            "isolated" | "webview" => Some(Self::Isolated),
            _ => None,
        }
    }

    /// Boot a sandbox of this kind.
    pub async fn bootstrap(
        self,
        scripts: BootScripts,
        services: HostServices,
        config: &SandboxConfig,
    ) -> Result<Arc<dyn SandboxBackend>> {
        let config = config.clone();
        let lane = match self {
            Self::InProcess => {
                lane::Lane::start::<inprocess::InProcessEngine>(scripts, services, config).await?
            }
            Self::Isolated => {
                lane::Lane::start::<isolated::IsolatedEngine>(scripts, services, config).await?
            }
        };
        Ok(Arc::new(lane))
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sources evaluated at boot: commons, then the runner, then the bootstrap
/// glue.
#[derive(Debug, Clone)]
pub struct BootScripts {
    pub commons: String,
    pub runner: String,
    pub bootstrap: String,
}

impl BootScripts {
    /// Embedded commons and bootstrap around the given runner source.
    pub fn new(runner: impl Into<String>) -> Self {
        Self {
            commons: COMMONS_JS.to_string(),
            runner: runner.into(),
            bootstrap: BOOTSTRAP_JS.to_string(),
        }
    }

    pub fn with_commons(mut self, commons: impl Into<String>) -> Self {
        self.commons = commons.into();
        self
    }

    /// Honors `commons_path` from the config when set.
    pub fn from_config(runner: impl Into<String>, config: &SandboxConfig) -> Result<Self> {
        let scripts = Self::new(runner);
        match &config.commons_path {
            Some(path) => Ok(scripts.with_commons(read_script(path)?)),
            None => Ok(scripts),
        }
    }
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| SandboxError::BootstrapFailed {
        reason: format!("cannot read {}: {err}", path.display()),
    })
}

/// A booted sandbox hosting one runner.
///
/// Calls into one sandbox are executed in arrival order; many callers may
/// await results concurrently.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn runner_id(&self) -> &str;

    /// Callable members of the runner, including inherited class methods.
    async fn method_names(&self) -> Result<Vec<String>>;

    async fn has_method(&self, method: &str) -> Result<bool>;

    /// JSON form of a runner property; `None` when absent or `null`.
    async fn read_property(&self, name: &str) -> Result<Option<Value>>;

    /// Call a runner method and await its (possibly async) result.
    /// `None` means the method produced `undefined` or `null`.
    async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Option<Value>>;

    /// Stop the lane. Pending calls fail with `SandboxClosed`.
    async fn shutdown(&self);
}

/// Label used in bootstrap failures.
pub(crate) fn boot_failure(stage: &str, detail: impl fmt::Display) -> SandboxError {
    SandboxError::BootstrapFailed {
        reason: format!("{stage}: {detail}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!(BackendKind::parse("in-process"), Some(BackendKind::InProcess));
        assert_eq!(BackendKind::parse("Isolated"), Some(BackendKind::Isolated));
        assert_eq!(BackendKind::parse("webview"), Some(BackendKind::Isolated));
        assert_eq!(BackendKind::parse("wasm"), None);
    }

    #[test]
    fn backend_kind_serde_is_snake_case() {
        let json = serde_json::to_string(&BackendKind::InProcess).unwrap();
        assert_eq!(json, "\"in_process\"");
        let kind: BackendKind = serde_json::from_str("\"isolated\"").unwrap();
        assert_eq!(kind, BackendKind::Isolated);
        assert_eq!(BackendKind::Isolated.to_string(), "isolated");
    }

    #[test]
    fn boot_scripts_embed_assets() {
        let scripts = BootScripts::new("var Runner = {};");
        assert!(scripts.commons.contains("NetworkClient"));
        assert!(scripts.bootstrap.contains(RUNNER_GLOBAL));
        assert_eq!(scripts.runner, "var Runner = {};");
    }

    #[test]
    fn missing_commons_path_is_bootstrap_failure() {
        let config = SandboxConfig::default().with_commons_path("/nonexistent/commons.js");
        let err = BootScripts::from_config("", &config).unwrap_err();
        assert!(matches!(err, SandboxError::BootstrapFailed { .. }));
    }
}
