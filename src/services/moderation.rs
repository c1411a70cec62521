// src/services/moderation.rs
//! Delete-request workflow.
//!
//! ```text
//! pending ──approve──▶ approved   (promise removed, owner count decremented)
//!    └─────reject────▶ rejected   (nothing else changes)
//! ```
//!
//! Both end states are final. At most one request per promise is pending;
//! asking again while one is pending returns the existing request.
//! The admin address is recorded for audit only; callers verify it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Decision, DeleteRequest, RequestStatus};
use crate::services::aggregation;
use crate::services::audit::{AuditLog, Severity};
use crate::services::records::Records;
use crate::services::store::Collection;
use crate::services::validation::{normalize_address, require_id};

pub struct Moderation {
    records: Arc<Records>,
    audit: Arc<AuditLog>,
}

impl Moderation {
    pub fn new(records: Arc<Records>, audit: Arc<AuditLog>) -> Self {
        Self { records, audit }
    }

    /// Open a pending request for `promise_id`, or return the one already pending.
    pub fn request_deletion(&self, promise_id: &str, requester: &str) -> LedgerResult<DeleteRequest> {
        let promise_id = require_id("promise", promise_id)?;
        let requester = normalize_address(requester)?;

        let mut uow = self
            .records
            .begin(&[Collection::Promises, Collection::DeleteRequests])?;
        if !uow.promises()?.iter().any(|p| p.id == promise_id) {
            return Err(LedgerError::not_found("promise", promise_id));
        }
        if let Some(existing) = uow
            .delete_requests()?
            .iter()
            .find(|r| r.promise_id == promise_id && r.status == RequestStatus::Pending)
        {
            tracing::debug!(request = %existing.id, promise = %promise_id, "delete already pending");
            return Ok(existing.clone());
        }

        let request = DeleteRequest {
            id: Uuid::new_v4().to_string(),
            promise_id: promise_id.clone(),
            requester_address: requester.clone(),
            status: RequestStatus::Pending,
            requested_at: Utc::now(),
            processed_by: None,
            processed_at: None,
        };
        uow.delete_requests_mut()?.push(request.clone());
        uow.commit()?;

        tracing::info!(request = %request.id, promise = %promise_id, "deletion requested");
        self.audit.record(
            "moderation",
            "deletion_requested",
            json!({ "request": request.id, "promise": promise_id, "requester": requester }),
            Severity::Medium,
        );
        Ok(request)
    }

    /// Approve or reject a pending request. Approval removes the promise in the
    /// same unit of work as the counter and stats updates.
    ///
    /// A blank `request_id` is a `Validation` error; an unknown one is `NotFound`.
    pub fn resolve(&self, request_id: &str, decision: Decision, admin: &str) -> LedgerResult<DeleteRequest> {
        let request_id = require_id("delete request", request_id)?;
        let admin = normalize_address(admin)?;
        let target: RequestStatus = decision.into();
        let now = Utc::now();

        let mut uow = self.records.begin(&[
            Collection::Users,
            Collection::Promises,
            Collection::DeleteRequests,
            Collection::Sessions,
            Collection::Stats,
        ])?;
        let request = {
            let request = uow
                .delete_requests_mut()?
                .iter_mut()
                .find(|r| r.id == request_id)
                .ok_or_else(|| LedgerError::not_found("delete request", request_id.as_str()))?;
            if request.status != RequestStatus::Pending {
                return Err(LedgerError::InvalidTransition {
                    kind: "delete request",
                    id: request_id.clone(),
                    from: request.status.to_string(),
                    to: target.to_string(),
                });
            }
            request.status = target;
            request.processed_by = Some(admin.clone());
            request.processed_at = Some(now);
            request.clone()
        };

        let mut removed = false;
        if decision == Decision::Approved {
            let promises = uow.promises_mut()?;
            match promises.iter().position(|p| p.id == request.promise_id) {
                Some(idx) => {
                    let promise = promises.remove(idx);
                    if let Some(owner) = uow
                        .users_mut()?
                        .iter_mut()
                        .find(|u| u.address == promise.address)
                    {
                        owner.total_promises = owner.total_promises.saturating_sub(1);
                    }
                    removed = true;
                }
                None => {
                    tracing::warn!(
                        request = %request_id,
                        promise = %request.promise_id,
                        "approved request targets a promise that no longer exists"
                    );
                }
            }
            aggregation::refresh(&mut uow)?;
        }
        uow.commit()?;

        tracing::info!(request = %request_id, decision = %target, removed, "delete request resolved");
        self.audit.record(
            "moderation",
            "deletion_resolved",
            json!({
                "request": request_id,
                "promise": request.promise_id,
                "decision": target.as_str(),
                "admin": admin,
                "promise_removed": removed,
            }),
            Severity::High,
        );
        Ok(request)
    }

    pub fn get_request(&self, id: &str) -> LedgerResult<DeleteRequest> {
        let id = require_id("delete request", id)?;
        self.records
            .read::<Vec<DeleteRequest>>(Collection::DeleteRequests)?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| LedgerError::not_found("delete request", id))
    }

    /// Oldest first, optionally only those in `status`.
    pub fn list_requests(&self, status: Option<RequestStatus>) -> LedgerResult<Vec<DeleteRequest>> {
        let mut out: Vec<DeleteRequest> = self
            .records
            .read::<Vec<DeleteRequest>>(Collection::DeleteRequests)?
            .into_iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect();
        out.sort_by(|a, b| a.requested_at.cmp(&b.requested_at));
        Ok(out)
    }
}
