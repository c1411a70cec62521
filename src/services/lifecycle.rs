// src/services/lifecycle.rs
//! Promise lifecycle: create, move to a terminal status, admin progress
//! override, and read-side listings.
//!
//! Status moves are strictly one-way. A promise that is already completed or
//! failed rejects further transitions, so the reputation engine runs at most
//! once per promise.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Difficulty, Outcome, Promise, PromiseFilter, PromiseStatus, User};
use crate::services::aggregation;
use crate::services::audit::{AuditLog, Severity};
use crate::services::records::Records;
use crate::services::reputation::apply_outcome;
use crate::services::store::Collection;
use crate::services::validation::{
    clean_proof, normalize_address, normalize_category, require_id, require_message,
    require_progress,
};

pub struct PromiseLifecycle {
    records: Arc<Records>,
    audit: Arc<AuditLog>,
}

impl PromiseLifecycle {
    pub fn new(records: Arc<Records>, audit: Arc<AuditLog>) -> Self {
        Self { records, audit }
    }

    /// Create an active promise, creating its owner on first sight.
    pub fn create_promise(
        &self,
        address: &str,
        message: &str,
        deadline: DateTime<Utc>,
        category: &str,
        difficulty: Difficulty,
    ) -> LedgerResult<Promise> {
        let address = normalize_address(address)?;
        let message = require_message(message)?;
        let category = normalize_category(category)?;
        let now = Utc::now();

        let promise = Promise {
            id: Uuid::new_v4().to_string(),
            address: address.clone(),
            message,
            deadline,
            status: PromiseStatus::Active,
            proof: None,
            created_at: now,
            updated_at: now,
            category,
            difficulty,
            admin_adjusted_progress: None,
        };

        let mut uow = self.records.begin(&aggregation::INPUTS)?;
        uow.promises_mut()?.push(promise.clone());
        let owner = owner_mut(uow.users_mut()?, &address, now);
        owner.total_promises += 1;
        owner.last_active = now;
        aggregation::refresh(&mut uow)?;
        uow.commit()?;

        tracing::info!(id = %promise.id, address = %address, "promise created");
        self.audit.record(
            "lifecycle",
            "promise_created",
            json!({ "id": promise.id, "address": address, "category": promise.category }),
            Severity::Low,
        );
        Ok(promise)
    }

    /// Move an active promise to `outcome` and apply it to the owner's reputation.
    ///
    /// A blank `id` is a `Validation` error, checked before any store access;
    /// a well-formed id with no matching promise is `NotFound`.
    pub fn update_promise_status(
        &self,
        id: &str,
        outcome: Outcome,
        proof: Option<String>,
    ) -> LedgerResult<Promise> {
        let id = require_id("promise", id)?;
        let target: PromiseStatus = outcome.into();
        let now = Utc::now();

        let mut uow = self.records.begin(&aggregation::INPUTS)?;
        let promise = {
            let promises = uow.promises_mut()?;
            let promise = promises
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| LedgerError::not_found("promise", id.as_str()))?;
            if promise.status.is_terminal() {
                return Err(LedgerError::InvalidTransition {
                    kind: "promise",
                    id: id.clone(),
                    from: promise.status.to_string(),
                    to: target.to_string(),
                });
            }
            promise.status = target;
            promise.proof = clean_proof(proof);
            promise.updated_at = now;
            promise.clone()
        };

        let owner = owner_mut(uow.users_mut()?, &promise.address, now);
        *owner = apply_outcome(owner, outcome);
        owner.last_active = now;
        let (reputation, level) = (owner.reputation, owner.level);

        aggregation::refresh(&mut uow)?;
        uow.commit()?;

        tracing::info!(id = %id, status = %target, reputation, level, "promise resolved");
        self.audit.record(
            "lifecycle",
            "promise_status_changed",
            json!({
                "id": id,
                "address": promise.address,
                "status": target.as_str(),
                "reputation": reputation,
                "level": level,
            }),
            Severity::Low,
        );
        Ok(promise)
    }

    /// Admin override of displayed progress. Status and reputation are untouched.
    pub fn admin_set_progress(&self, id: &str, progress: i64) -> LedgerResult<Promise> {
        let id = require_id("promise", id)?;
        let progress = require_progress(progress)?;

        let mut uow = self.records.begin(&[Collection::Promises])?;
        let promise = {
            let promise = uow
                .promises_mut()?
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or_else(|| LedgerError::not_found("promise", id.as_str()))?;
            promise.admin_adjusted_progress = Some(progress);
            promise.updated_at = Utc::now();
            promise.clone()
        };
        uow.commit()?;

        tracing::info!(id = %id, progress, "admin progress set");
        self.audit.record(
            "lifecycle",
            "admin_progress_set",
            json!({ "id": id, "progress": progress }),
            Severity::Medium,
        );
        Ok(promise)
    }

    pub fn get_promise(&self, id: &str) -> LedgerResult<Promise> {
        let id = require_id("promise", id)?;
        self.records
            .read::<Vec<Promise>>(Collection::Promises)?
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| LedgerError::not_found("promise", id))
    }

    /// Newest first.
    pub fn list_promises(&self, filter: &PromiseFilter) -> LedgerResult<Vec<Promise>> {
        let address = filter
            .address
            .as_deref()
            .map(normalize_address)
            .transpose()?;
        let mut out: Vec<Promise> = self
            .records
            .read::<Vec<Promise>>(Collection::Promises)?
            .into_iter()
            .filter(|p| address.as_deref().is_none_or(|a| p.address == a))
            .filter(|p| filter.status.is_none_or(|s| p.status == s))
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

/// Existing user for `address`, or a freshly appended zero-valued one.
pub(crate) fn owner_mut<'u>(users: &'u mut Vec<User>, address: &str, now: DateTime<Utc>) -> &'u mut User {
    let idx = match users.iter().position(|u| u.address == address) {
        Some(i) => i,
        None => {
            users.push(User::new(address, now));
            users.len() - 1
        }
    };
    &mut users[idx]
}
