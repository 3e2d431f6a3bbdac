//! Wiring of the long-lived host services behind the CLI commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use runnerhost_sandbox::{EncryptedStore, HostServices, ReqwestClient, RunnerLoader, RunnerRegistry};
use runnerhost_store::{Database, RunnerRecordStore, RunnerStateStore};
use runnerhost_vault::{FileKeychain, SecureStore, keychain};
use tracing::info;

use crate::config::HostConfig;

/// Host id used for the service template; every runner gets its own copy.
const HOST_NAMESPACE: &str = "runnerhost";

pub struct Host {
    pub loader: RunnerLoader,
    pub registry: RunnerRegistry,
    pub records: RunnerRecordStore,
}

impl Host {
    /// Open the database and the vault under `data_dir` and build a loader
    /// whose runners persist their records there.
    pub async fn open(config: &HostConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("failed to create data directory {}", config.data_dir.display()))?;

        let db_path = config.database_path();
        let db = Database::open_and_migrate(db_path.clone())
            .await
            .context("failed to open database")?;
        info!(path = %db_path.display(), "store initialized");

        let key_file = FileKeychain::new(FileKeychain::default_path(&config.data_dir));
        let master_key = keychain::load_or_create_master_key(&key_file).context("failed to load vault key")?;
        let vault = SecureStore::open(config.vault_path(), &master_key).context("failed to open vault")?;
        info!("vault initialized");

        let http = ReqwestClient::new(&config.sandbox).context("failed to build http client")?;
        let services = HostServices::new(
            HOST_NAMESPACE,
            Arc::new(RunnerStateStore::new(db.clone())),
            Arc::new(EncryptedStore::new(Arc::new(vault))),
            Arc::new(http),
        );

        let records = RunnerRecordStore::new(db);
        Ok(Self {
            loader: RunnerLoader::new(config.sandbox.clone(), services).with_records(records.clone()),
            registry: RunnerRegistry::new().with_records(records.clone()),
            records,
        })
    }

    pub async fn close(self) {
        self.registry.unload_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_data_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = HostConfig {
            data_dir: dir.path().join("data"),
            ..HostConfig::default()
        };
        let host = Host::open(&config).await.unwrap();
        assert!(config.database_path().exists());
        assert!(FileKeychain::default_path(&config.data_dir).exists());
        assert!(host.records.list(None).await.unwrap().is_empty());
        host.close().await;

        // Reopening reuses the stored key.
        Host::open(&config).await.unwrap().close().await;
    }
}
