// src/services/users.rs
//! Read-only user queries. Users are created and mutated by the lifecycle
//! and moderation services; nothing here writes.

use std::sync::Arc;

use crate::error::{LedgerError, LedgerResult};
use crate::models::User;
use crate::services::records::Records;
use crate::services::store::Collection;
use crate::services::validation::normalize_address;

pub struct UserDirectory {
    records: Arc<Records>,
}

impl UserDirectory {
    pub fn new(records: Arc<Records>) -> Self {
        Self { records }
    }

    pub fn get_user(&self, address: &str) -> LedgerResult<User> {
        let address = normalize_address(address)?;
        self.list_users()?
            .into_iter()
            .find(|u| u.address == address)
            .ok_or_else(|| LedgerError::not_found("user", address))
    }

    /// Insertion order.
    pub fn list_users(&self) -> LedgerResult<Vec<User>> {
        Ok(self.records.read::<Vec<User>>(Collection::Users)?)
    }

    /// Highest reputation first; equal scores keep insertion order.
    pub fn leaderboard(&self, limit: usize) -> LedgerResult<Vec<User>> {
        let mut users = self.list_users()?;
        users.sort_by(|a, b| b.reputation.cmp(&a.reputation));
        users.truncate(limit);
        Ok(users)
    }
}
