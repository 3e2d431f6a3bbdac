//! Loading runners: bootstrap, identify, classify, persist, publish.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::backend::{BootScripts, SandboxBackend};
use crate::classify::{self, Classification};
use crate::codec;
use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::facade::{Runner, RunnerHandle};
use crate::handlers::HostServices;
use crate::runner::RunnerInfo;
use runnerhost_store::{RunnerRecord, RunnerRecordStore};

/// Host version runners compare `minSupportedAppVersion` against.
pub const HOST_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct RunnerLoader {
    config: SandboxConfig,
    services: HostServices,
    records: Option<RunnerRecordStore>,
    host_version: String,
}

impl RunnerLoader {
    /// `services` is a template; each runner gets a copy scoped to its id.
    /// The network default timeout is taken from `config`.
    pub fn new(config: SandboxConfig, services: HostServices) -> Self {
        let services = services.with_request_timeout(config.request_timeout());
        Self {
            config,
            services,
            records: None,
            host_version: HOST_VERSION.to_string(),
        }
    }

    /// Persist a record for every runner that loads successfully.
    pub fn with_records(mut self, records: RunnerRecordStore) -> Self {
        self.records = Some(records);
        self
    }

    pub fn with_host_version(mut self, version: impl Into<String>) -> Self {
        self.host_version = version.into();
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Load one runner from source text.
    #[instrument(skip(self, source), fields(backend = %self.config.backend))]
    pub async fn load_source(&self, runner_id: &str, source: &str) -> Result<Runner> {
        let scripts = BootScripts::from_config(source, &self.config)?;
        let services = self.services.for_runner(runner_id);
        let backend = self
            .config
            .backend
            .bootstrap(scripts, services, &self.config)
            .await?;

        match self.identify(runner_id, backend.as_ref()).await {
            Ok((info, classification)) => {
                let handle = RunnerHandle::new(backend, info, classification);
                self.persist(&handle).await;
                info!(
                    runner = runner_id,
                    environment = %handle.environment(),
                    capabilities = handle.intents().capabilities().len(),
                    "runner loaded"
                );
                Runner::from_handle(handle)
            }
            Err(err) => {
                backend.shutdown().await;
                Err(err)
            }
        }
    }

    /// Load a runner file; its id is the file stem.
    pub async fn load_file(&self, path: &Path) -> Result<Runner> {
        let runner_id = runner_id_for(path)?;
        let source = tokio::fs::read_to_string(path).await?;
        self.load_source(&runner_id, &source).await
    }

    /// Load every runner script in `dir`, in file-name order. Failures are
    /// logged and skipped.
    pub async fn load_dir(&self, dir: &Path) -> Result<Vec<Runner>> {
        let mut runners = Vec::new();
        for path in self.scripts_in(dir).await? {
            match self.load_file(&path).await {
                Ok(runner) => runners.push(runner),
                Err(err) => {
                    warn!(path = %path.display(), kind = err.kind(), error = %err, "skipping runner");
                }
            }
        }
        Ok(runners)
    }

    async fn scripts_in(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(&self.config.script_extension));
            if matches && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn identify(&self, runner_id: &str, backend: &dyn SandboxBackend) -> Result<(RunnerInfo, Classification)> {
        let raw = backend
            .read_property("info")
            .await?
            .ok_or_else(|| SandboxError::BootstrapFailed {
                reason: "runner exposes no `info`".into(),
            })?;
        let info: RunnerInfo = codec::decode_value(raw).map_err(|err| SandboxError::BootstrapFailed {
            reason: format!("invalid `info`: {err}"),
        })?;

        if info.id != runner_id {
            return Err(SandboxError::BootstrapFailed {
                reason: format!("runner declares id `{}` but was loaded as `{runner_id}`", info.id),
            });
        }
        if !info.supports_host(&self.host_version) {
            return Err(SandboxError::BootstrapFailed {
                reason: format!(
                    "runner requires host {} (this is {})",
                    info.min_supported_app_version.as_deref().unwrap_or("?"),
                    self.host_version
                ),
            });
        }

        let classification = classify::classify_backend(backend).await?;
        Ok((info, classification))
    }

    /// Best effort: a failed write is logged, the runner still loads.
    async fn persist(&self, handle: &RunnerHandle) {
        let Some(records) = &self.records else {
            return;
        };
        let info = handle.info();
        let record = RunnerRecord {
            id: info.id.clone(),
            name: info.name.clone(),
            version: info.version,
            environment: handle.environment().as_str().to_string(),
            intents: handle.intents().to_flags(),
            backend: handle.backend_kind().as_str().to_string(),
            info: serde_json::to_value(info).unwrap_or_default(),
            updated_at: chrono::Utc::now().timestamp(),
        };
        if let Err(err) = records.save(&record).await {
            warn!(runner = %info.id, error = %err, "failed to persist runner record");
        }
    }
}

/// Runner id for a script path: the file stem.
pub fn runner_id_for(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SandboxError::BootstrapFailed {
            reason: format!("cannot derive a runner id from {}", path.display()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_id_is_file_stem() {
        assert_eq!(runner_id_for(Path::new("/runners/mangadex.js")).unwrap(), "mangadex");
        assert!(runner_id_for(Path::new("/")).is_err());
    }
}
