// src/models.rs
//! Persisted record shapes. Field names on the wire are camelCase and are a
//! public contract, so renames here are breaking changes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::services::reputation::level_for;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub address: String,
    pub reputation: u64,
    pub completed_promises: u64,
    pub failed_promises: u64,
    pub total_promises: u64,
    pub streak: u64,
    pub level: u64,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl User {
    /// Zero-valued user, as created the first time an address is seen.
    pub fn new(address: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            reputation: 0,
            completed_promises: 0,
            failed_promises: 0,
            total_promises: 0,
            streak: 0,
            level: level_for(0),
            joined_at: now,
            last_active: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromiseStatus {
    Active,
    Completed,
    Failed,
}

impl PromiseStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PromiseStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PromiseStatus::Active => "active",
            PromiseStatus::Completed => "completed",
            PromiseStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PromiseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromiseStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(PromiseStatus::Active),
            "completed" => Ok(PromiseStatus::Completed),
            "failed" => Ok(PromiseStatus::Failed),
            other => Err(LedgerError::validation(format!(
                "unknown promise status `{other}`"
            ))),
        }
    }
}

/// Terminal result of a promise; the only statuses a caller may move to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Completed,
    Failed,
}

impl From<Outcome> for PromiseStatus {
    fn from(o: Outcome) -> Self {
        match o {
            Outcome::Completed => PromiseStatus::Completed,
            Outcome::Failed => PromiseStatus::Failed,
        }
    }
}

impl FromStr for Outcome {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.parse::<PromiseStatus>()? {
            PromiseStatus::Completed => Ok(Outcome::Completed),
            PromiseStatus::Failed => Ok(Outcome::Failed),
            PromiseStatus::Active => Err(LedgerError::validation(
                "a promise can only be moved to completed or failed",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl FromStr for Difficulty {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(LedgerError::validation(format!(
                "unknown difficulty `{other}` (expected easy, medium or hard)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promise {
    pub id: String,
    pub address: String,
    pub message: String,
    pub deadline: DateTime<Utc>,
    pub status: PromiseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub category: String,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_adjusted_progress: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(LedgerError::validation(format!(
                "unknown request status `{other}`"
            ))),
        }
    }
}

/// Admin verdict on a pending delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for RequestStatus {
    fn from(d: Decision) -> Self {
        match d {
            Decision::Approved => RequestStatus::Approved,
            Decision::Rejected => RequestStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(Decision::Approved),
            "reject" | "rejected" => Ok(Decision::Rejected),
            other => Err(LedgerError::validation(format!(
                "unknown decision `{other}` (expected approved or rejected)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub id: String,
    pub promise_id: String,
    pub requester_address: String,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub ip: String,
    pub first_visit: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    /// Distinct session ids, not distinct addresses.
    pub total_users: u64,
    pub total_promises: u64,
    pub completion_rate: f64,
    pub average_reputation: f64,
    pub top_performer: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl Default for GlobalStats {
    fn default() -> Self {
        Self {
            total_users: 0,
            total_promises: 0,
            completion_rate: 0.0,
            average_reputation: 0.0,
            top_performer: None,
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Filter for promise listings. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct PromiseFilter {
    pub address: Option<String>,
    pub status: Option<PromiseStatus>,
}
