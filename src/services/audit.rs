// src/services/audit.rs
//! Action logbook: one JSON object per line for every mutating operation.
//!
//! Audit is best effort. A failed append is reported through `tracing` and
//! never fails the operation that triggered it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug)]
pub struct AuditLog {
    path: Option<PathBuf>,
    // serializes appends from concurrent operations
    write_lock: Mutex<()>,
}

impl AuditLog {
    /// Append to `path` (created on first write).
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            write_lock: Mutex::new(()),
        }
    }

    /// Discard everything.
    pub fn disabled() -> Self {
        Self {
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record one action.
    ///
    /// * `agent`: component name, e.g. `"lifecycle"`, `"moderation"`.
    /// * `action`: short verb label, e.g. `"promise_created"`.
    /// * `details`: free-form JSON (ids, addresses, decisions).
    pub fn record(&self, agent: &str, action: &str, details: Value, severity: Severity) {
        let Some(path) = &self.path else {
            return;
        };
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": "action",
            "agent": agent,
            "action": action,
            "severity": severity.as_str(),
            "details": details,
        });
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = append_jsonl(path, &entry) {
            tracing::warn!(path = %path.display(), error = %err, "audit append failed");
        }
    }
}

fn append_jsonl(path: &Path, entry: &Value) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    // one write per line so appends from other handles never interleave
    let mut f = fs::OpenOptions::new().create(true).append(true).open(path)?;
    f.write_all(line.as_bytes())
}
