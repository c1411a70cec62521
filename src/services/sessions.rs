// src/services/sessions.rs
//! Anonymous visit tracking. Sessions are only ever added or touched, and
//! their count is what GlobalStats reports as `totalUsers`.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::error::LedgerResult;
use crate::models::Session;
use crate::services::aggregation;
use crate::services::audit::{AuditLog, Severity};
use crate::services::records::Records;
use crate::services::validation::require_id;

pub struct SessionTracker {
    records: Arc<Records>,
    audit: Arc<AuditLog>,
}

impl SessionTracker {
    pub fn new(records: Arc<Records>, audit: Arc<AuditLog>) -> Self {
        Self { records, audit }
    }

    /// Record a visit. First sight sets `firstVisit`; every call bumps
    /// `lastActive` and stores the latest ip.
    pub fn touch_session(&self, session_id: &str, ip: &str) -> LedgerResult<Session> {
        let session_id = require_id("session", session_id)?;
        let ip = ip.trim().to_string();
        let now = Utc::now();

        let mut uow = self.records.begin(&aggregation::INPUTS)?;
        let (session, is_new) = {
            let sessions = uow.sessions_mut()?;
            match sessions.iter_mut().find(|s| s.id == session_id) {
                Some(s) => {
                    s.last_active = now;
                    s.ip = ip;
                    (s.clone(), false)
                }
                None => {
                    let s = Session {
                        id: session_id.clone(),
                        ip,
                        first_visit: now,
                        last_active: now,
                    };
                    sessions.push(s.clone());
                    (s, true)
                }
            }
        };
        aggregation::refresh(&mut uow)?;
        uow.commit()?;

        if is_new {
            tracing::info!(session = %session_id, "new session");
            self.audit.record(
                "sessions",
                "session_started",
                json!({ "session": session_id, "ip": session.ip }),
                Severity::Low,
            );
        }
        Ok(session)
    }
}
