// src/commands/api.rs
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::commands::init::{ensure_initialized, ensure_initialized_once};
use crate::config::{Backend, LedgerConfig};
use crate::error::LedgerResult;
use crate::models::{
    Decision, DeleteRequest, Difficulty, GlobalStats, Outcome, Promise, PromiseFilter,
    RequestStatus, Session, User,
};
use crate::services::aggregation;
use crate::services::audit::AuditLog;
use crate::services::lifecycle::PromiseLifecycle;
use crate::services::moderation::Moderation;
use crate::services::records::Records;
use crate::services::sessions::SessionTracker;
use crate::services::sqlite::SqliteStore;
use crate::services::store::{Collection, FileStore, RecordStore};
use crate::services::users::UserDirectory;

/// Single entry point for every ledger operation. Cheap to share behind an
/// `Arc`; all methods take `&self`.
pub struct Commands {
    records: Arc<Records>,
    lifecycle: PromiseLifecycle,
    moderation: Moderation,
    sessions: SessionTracker,
    users: UserDirectory,
}

impl Commands {
    /// Open the default root (`PROMISE_LEDGER_ROOT` or `.promise-ledger`).
    pub fn open_default() -> Result<Self> {
        let report = ensure_initialized_once()?;
        Self::from_config(&report.config)
    }

    /// Initialize `root` if needed and open it.
    pub fn open(root: &Path) -> Result<Self> {
        let report = ensure_initialized(root)?;
        Self::from_config(&report.config)
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        let store: Arc<dyn RecordStore> = match config.storage.backend {
            Backend::Json => Arc::new(
                FileStore::open(&config.storage.path)
                    .with_context(|| format!("opening json store {:?}", config.storage.path))?,
            ),
            Backend::Sqlite => Arc::new(
                SqliteStore::open(&config.storage.path)
                    .with_context(|| format!("opening sqlite store {:?}", config.storage.path))?,
            ),
        };
        let audit = if config.audit.enabled {
            AuditLog::to_file(&config.audit.path)
        } else {
            AuditLog::disabled()
        };
        tracing::info!(
            backend = ?config.storage.backend,
            path = %config.storage.path.display(),
            "ledger opened"
        );
        Ok(Self::with_store(store, audit))
    }

    /// Wire the services over an arbitrary backend (e.g. `MemoryStore` in tests).
    pub fn with_store(store: Arc<dyn RecordStore>, audit: AuditLog) -> Self {
        let records = Arc::new(Records::new(store));
        let audit = Arc::new(audit);
        Self {
            lifecycle: PromiseLifecycle::new(records.clone(), audit.clone()),
            moderation: Moderation::new(records.clone(), audit.clone()),
            sessions: SessionTracker::new(records.clone(), audit),
            users: UserDirectory::new(records.clone()),
            records,
        }
    }

    // ---------- promises ----------

    pub fn create_promise(
        &self,
        address: &str,
        message: &str,
        deadline: DateTime<Utc>,
        category: &str,
        difficulty: Difficulty,
    ) -> LedgerResult<Promise> {
        self.lifecycle
            .create_promise(address, message, deadline, category, difficulty)
    }

    pub fn update_promise_status(
        &self,
        id: &str,
        outcome: Outcome,
        proof: Option<String>,
    ) -> LedgerResult<Promise> {
        self.lifecycle.update_promise_status(id, outcome, proof)
    }

    pub fn admin_set_progress(&self, id: &str, progress: i64) -> LedgerResult<Promise> {
        self.lifecycle.admin_set_progress(id, progress)
    }

    pub fn get_promise(&self, id: &str) -> LedgerResult<Promise> {
        self.lifecycle.get_promise(id)
    }

    /// Every promise, newest first.
    pub fn get_promises(&self) -> LedgerResult<Vec<Promise>> {
        self.lifecycle.list_promises(&PromiseFilter::default())
    }

    pub fn list_promises(&self, filter: &PromiseFilter) -> LedgerResult<Vec<Promise>> {
        self.lifecycle.list_promises(filter)
    }

    // ---------- moderation ----------

    pub fn request_deletion(&self, promise_id: &str, requester: &str) -> LedgerResult<DeleteRequest> {
        self.moderation.request_deletion(promise_id, requester)
    }

    pub fn resolve(&self, request_id: &str, decision: Decision, admin: &str) -> LedgerResult<DeleteRequest> {
        self.moderation.resolve(request_id, decision, admin)
    }

    pub fn get_request(&self, id: &str) -> LedgerResult<DeleteRequest> {
        self.moderation.get_request(id)
    }

    pub fn list_requests(&self, status: Option<RequestStatus>) -> LedgerResult<Vec<DeleteRequest>> {
        self.moderation.list_requests(status)
    }

    // ---------- users & sessions ----------

    pub fn get_user(&self, address: &str) -> LedgerResult<User> {
        self.users.get_user(address)
    }

    pub fn list_users(&self) -> LedgerResult<Vec<User>> {
        self.users.list_users()
    }

    pub fn leaderboard(&self, limit: usize) -> LedgerResult<Vec<User>> {
        self.users.leaderboard(limit)
    }

    pub fn touch_session(&self, session_id: &str, ip: &str) -> LedgerResult<Session> {
        self.sessions.touch_session(session_id, ip)
    }

    // ---------- stats ----------

    /// Last materialized stats; zeros if nothing was ever recorded.
    pub fn stats(&self) -> LedgerResult<GlobalStats> {
        Ok(self.records.read::<GlobalStats>(Collection::Stats)?)
    }

    /// Full rescan outside of any other mutation.
    pub fn recompute(&self) -> LedgerResult<GlobalStats> {
        let mut uow = self.records.begin(&aggregation::INPUTS)?;
        let stats = aggregation::refresh(&mut uow)?;
        uow.commit()?;
        Ok(stats)
    }
}
