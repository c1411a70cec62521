// src/services/aggregation.rs
//! GlobalStats recomputation. Always a full scan; the stored stats are a
//! materialized view and are never patched incrementally.

use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::models::{GlobalStats, Promise, PromiseStatus, Session, User};
use crate::services::records::UnitOfWork;
use crate::services::store::Collection;

/// Collections a unit of work must declare before calling [`refresh`].
pub const INPUTS: [Collection; 4] = [
    Collection::Users,
    Collection::Promises,
    Collection::Sessions,
    Collection::Stats,
];

pub fn compute(
    users: &[User],
    promises: &[Promise],
    sessions: &[Session],
    now: DateTime<Utc>,
) -> GlobalStats {
    let mut ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    let total_users = ids.len() as u64;

    let total_promises = promises.len() as u64;
    let completed = promises
        .iter()
        .filter(|p| p.status == PromiseStatus::Completed)
        .count() as f64;
    let completion_rate = if total_promises == 0 {
        0.0
    } else {
        round9(100.0 * completed / total_promises as f64)
    };

    let reputation_sum: u64 = users.iter().map(|u| u.reputation).sum();
    let average_reputation = if total_users == 0 {
        0.0
    } else {
        round9(reputation_sum as f64 / total_users as f64)
    };

    // First max in scan order wins ties.
    let mut top: Option<&User> = None;
    for u in users {
        if top.map_or(true, |t| u.reputation > t.reputation) {
            top = Some(u);
        }
    }

    GlobalStats {
        total_users,
        total_promises,
        completion_rate,
        average_reputation,
        top_performer: top.map(|u| u.address.clone()),
        last_updated: now,
    }
}

/// Recompute stats from the unit's current (possibly uncommitted) view and
/// stage the result.
pub fn refresh(uow: &mut UnitOfWork<'_>) -> StorageResult<GlobalStats> {
    let users = uow.users()?.clone();
    let promises = uow.promises()?.clone();
    let sessions = uow.sessions()?.clone();
    let stats = compute(&users, &promises, &sessions, Utc::now());
    *uow.stats_mut()? = stats.clone();
    tracing::debug!(
        total_users = stats.total_users,
        total_promises = stats.total_promises,
        "global stats refreshed"
    );
    Ok(stats)
}

fn round9(x: f64) -> f64 {
    (x * 1e9).round() / 1e9
}
