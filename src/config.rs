use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root directory override, mainly for tests and side-by-side installs.
pub const ROOT_ENV: &str = "PROMISE_LEDGER_ROOT";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl LedgerConfig {
    /// Load `<root>/config.toml`, falling back to defaults when it is absent.
    /// Relative paths are resolved against `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("config.toml");
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str::<LedgerConfig>(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::info!(
                "No config file found at {}. Using LedgerConfig::default().",
                path.display()
            );
            LedgerConfig::default()
        };
        cfg.resolve_paths(root);
        Ok(cfg)
    }

    fn resolve_paths(&mut self, root: &Path) {
        self.storage.path = absolutize(root, &self.storage.path);
        self.audit.path = absolutize(root, &self.audit.path);
    }
}

/// `PROMISE_LEDGER_ROOT` if set, else `.promise-ledger` in the working directory.
pub fn ledger_root() -> PathBuf {
    std::env::var_os(ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".promise-ledger"))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemConfig {
    #[serde(default = "SystemConfig::default_name")]
    pub name: String,
}

impl SystemConfig {
    fn default_name() -> String {
        "promise-ledger".to_string()
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// One JSON file per collection, replaced atomically.
    Json,
    /// Single SQLite database, one row per collection.
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_backend")]
    pub backend: Backend,
    /// Directory for `json`, database file for `sqlite`.
    #[serde(default = "StorageConfig::default_path")]
    pub path: PathBuf,
}

impl StorageConfig {
    fn default_backend() -> Backend {
        Backend::Json
    }

    fn default_path() -> PathBuf {
        PathBuf::from("data")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Self::default_backend(),
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "AuditConfig::default_true")]
    pub enabled: bool,
    #[serde(default = "AuditConfig::default_path")]
    pub path: PathBuf,
}

impl AuditConfig {
    fn default_true() -> bool {
        true
    }

    fn default_path() -> PathBuf {
        PathBuf::from("logbook/actions.jsonl")
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_true(),
            path: Self::default_path(),
        }
    }
}

fn absolutize(root: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}
