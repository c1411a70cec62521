// src/commands/init.rs

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Backend, LedgerConfig, ledger_root};
use crate::services::store::write_atomic;

#[derive(Debug, Clone)]
pub struct InitReport {
    pub root: PathBuf,
    pub config: LedgerConfig,
    pub created: Vec<String>,
    pub existed: Vec<String>,
}

// ---------- single global init gate ----------

static INIT: OnceCell<InitReport> = OnceCell::new();

/// Initialize the default root (see [`ledger_root`]) once per process.
pub fn ensure_initialized_once() -> Result<&'static InitReport> {
    INIT.get_or_try_init(|| ensure_initialized(&ledger_root()))
}

/// Create the directory layout and a default `config.toml` under `root`.
/// Idempotent; existing files are never overwritten.
pub fn ensure_initialized(root: &Path) -> Result<InitReport> {
    let root = root.to_path_buf();
    let mut created = Vec::new();
    let mut existed = Vec::new();

    ensure_dir(&root, "", &mut created, &mut existed)?;
    ensure_file(&root, "config.toml", DEFAULT_CONFIG_TOML, &mut created, &mut existed)?;

    let config = LedgerConfig::load(&root)?;

    let data_dir = match config.storage.backend {
        Backend::Json => config.storage.path.clone(),
        Backend::Sqlite => config
            .storage
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone()),
    };
    ensure_abs_dir(&root, &data_dir, &mut created, &mut existed)?;
    let audit_dir = config.audit.path.parent().filter(|_| config.audit.enabled);
    if let Some(parent) = audit_dir {
        ensure_abs_dir(&root, parent, &mut created, &mut existed)?;
    }

    tracing::debug!(root = %root.display(), created = created.len(), "ledger root ready");
    Ok(InitReport {
        root,
        config,
        created,
        existed,
    })
}

fn ensure_dir(
    base: &Path,
    rel: &str,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let p = if rel.is_empty() { base.to_path_buf() } else { base.join(rel) };
    let label = if rel.is_empty() { ".".to_string() } else { rel.to_string() };
    if p.exists() {
        existed.push(label);
        return Ok(());
    }
    fs::create_dir_all(&p).with_context(|| format!("create_dir_all({:?})", p))?;
    created.push(label);
    Ok(())
}

fn ensure_abs_dir(
    root: &Path,
    dir: &Path,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let label = dir
        .strip_prefix(root)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| dir.to_string_lossy().into_owned());
    if dir.exists() {
        existed.push(label);
        return Ok(());
    }
    fs::create_dir_all(dir).with_context(|| format!("create_dir_all({:?})", dir))?;
    created.push(label);
    Ok(())
}

fn ensure_file(
    base: &Path,
    rel_file: &str,
    content_if_absent: &str,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let p = base.join(rel_file);
    if p.exists() {
        existed.push(rel_file.to_string());
        return Ok(());
    }
    write_atomic(&p, content_if_absent.as_bytes())
        .with_context(|| format!("writing {:?}", p))?;
    created.push(rel_file.to_string());
    Ok(())
}

// ---------- defaults ----------

const DEFAULT_CONFIG_TOML: &str = r#"[system]
name = "promise-ledger"

[storage]
# "json" keeps one file per collection under `path`;
# "sqlite" keeps every collection in the database file at `path`.
backend = "json"
path = "data"

[audit]
enabled = true
path = "logbook/actions.jsonl"
"#;
