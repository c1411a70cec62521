// src/services/validation.rs
//! Input normalization shared by the lifecycle, moderation and session
//! services. Everything here returns `LedgerError::Validation` on bad input.

use chrono::{DateTime, Utc};

use crate::error::{LedgerError, LedgerResult};

/// Longest accepted promise text, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Longest accepted category label, in characters.
pub const MAX_CATEGORY_CHARS: usize = 64;

/// Category used when the caller leaves it blank.
pub const DEFAULT_CATEGORY: &str = "general";

/// Trim and lowercase an address. Blank addresses are rejected.
pub fn normalize_address(raw: &str) -> LedgerResult<String> {
    let addr = raw.trim().to_lowercase();
    if addr.is_empty() {
        return Err(LedgerError::validation("address is required"));
    }
    Ok(addr)
}

pub fn require_message(raw: &str) -> LedgerResult<String> {
    let msg = raw.trim();
    if msg.is_empty() {
        return Err(LedgerError::validation("message is required"));
    }
    if msg.chars().count() > MAX_MESSAGE_CHARS {
        return Err(LedgerError::validation(format!(
            "message longer than {MAX_MESSAGE_CHARS} characters"
        )));
    }
    Ok(msg.to_string())
}

pub fn normalize_category(raw: &str) -> LedgerResult<String> {
    let cat = raw.trim();
    if cat.is_empty() {
        return Ok(DEFAULT_CATEGORY.to_string());
    }
    if cat.chars().count() > MAX_CATEGORY_CHARS {
        return Err(LedgerError::validation(format!(
            "category longer than {MAX_CATEGORY_CHARS} characters"
        )));
    }
    Ok(cat.to_string())
}

/// Progress override must be a percentage.
pub fn require_progress(progress: i64) -> LedgerResult<u8> {
    match u8::try_from(progress) {
        Ok(p) if p <= 100 => Ok(p),
        _ => Err(LedgerError::validation(format!(
            "progress {progress} is outside 0..=100"
        ))),
    }
}

/// Parse an RFC 3339 deadline. Past timestamps are accepted; enforcing
/// deadlines is not the ledger's job.
pub fn parse_deadline(raw: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::validation(format!("deadline `{raw}` is not RFC 3339: {e}")))
}

/// Blank ids (sessions, promises, requests) are rejected; others are trimmed.
pub fn require_id(kind: &str, raw: &str) -> LedgerResult<String> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(LedgerError::validation(format!("{kind} id is required")));
    }
    Ok(id.to_string())
}

/// Empty or whitespace-only proof counts as no proof.
pub fn clean_proof(proof: Option<String>) -> Option<String> {
    proof
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}
