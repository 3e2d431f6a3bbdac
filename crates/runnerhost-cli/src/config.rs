//! Host configuration.
//!
//! Read from a TOML file, then overridden by `RUNNERHOST_*` environment
//! variables (a `.env` file in the working directory is loaded first).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use runnerhost_sandbox::{BackendKind, SandboxConfig};
use serde::Deserialize;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "runnerhost.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Holds the database, the vault and the vault key.
    pub data_dir: PathBuf,
    /// Scanned by `runnerhost list --scan`.
    pub runners_dir: PathBuf,
    pub sandbox: SandboxConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            runners_dir: PathBuf::from("runners"),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl HostConfig {
    /// Load `path`, or `runnerhost.toml` when it exists, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Self::default(),
        };
        config.with_env_overrides(|name| std::env::var(name).ok())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `RUNNERHOST_DATA_DIR` and `RUNNERHOST_BACKEND`.
    pub fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = var("RUNNERHOST_DATA_DIR").filter(|d| !d.is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(name) = var("RUNNERHOST_BACKEND").filter(|b| !b.is_empty()) {
            let Some(backend) = BackendKind::parse(&name) else {
                bail!("RUNNERHOST_BACKEND: unknown backend `{name}`");
            };
            self.sandbox.backend = backend;
        }
        Ok(self)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("runnerhost.db")
    }

    pub fn vault_path(&self) -> PathBuf {
        self.data_dir.join("vault.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = HostConfig::from_toml(
            r#"
runners_dir = "scripts"

[sandbox]
backend = "isolated"
request_timeout_ms = 5000
"#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.runners_dir, PathBuf::from("scripts"));
        assert_eq!(config.sandbox.backend, BackendKind::Isolated);
        assert_eq!(config.sandbox.request_timeout_ms, 5000);
        assert_eq!(config.sandbox.script_extension, "js");
    }

    #[test]
    fn env_overrides_win() {
        let config = HostConfig::default()
            .with_env_overrides(|name| match name {
                "RUNNERHOST_DATA_DIR" => Some("/var/lib/runnerhost".into()),
                "RUNNERHOST_BACKEND" => Some("webview".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/runnerhost/runnerhost.db"));
        assert_eq!(config.sandbox.backend, BackendKind::Isolated);
    }

    #[test]
    fn bad_backend_override_is_an_error() {
        let result = HostConfig::default().with_env_overrides(|name| {
            (name == "RUNNERHOST_BACKEND").then(|| "wasm".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn file_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.toml");
        std::fs::write(&path, "data_dir = \"/tmp/rh\"\n").unwrap();
        let config = HostConfig::from_file(&path).unwrap();
        assert_eq!(config.vault_path(), PathBuf::from("/tmp/rh/vault.db"));
        assert!(HostConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
