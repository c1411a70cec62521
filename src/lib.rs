//! Promise ledger core.
//!
//! Users declare promises with deadlines; completing or failing them moves
//! their reputation. Deleting a promise needs an admin-approved request.
//! Global stats are recomputed in full after every mutation that can move
//! them. Everything persists through a [`services::RecordStore`] with
//! per-collection locking and all-or-nothing commits.
//!
//! Start from [`commands::Commands`].

pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use error::{LedgerError, LedgerResult, StorageError};
