// src/error.rs
//! Error taxonomy for the ledger core.
//!
//! `LedgerError` is what every public operation returns. Storage failures are
//! kept in their own enum so backends do not need to know about validation or
//! state-machine rules.

use thiserror::Error;

use crate::services::store::Collection;

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        kind: &'static str,
        id: String,
        from: String,
        to: String,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("opening data directory {path:?}: {source}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o on collection `{collection}`: {source}")]
    Io {
        collection: Collection,
        #[source]
        source: std::io::Error,
    },

    /// Bytes exist but do not decode. Never treated as an empty collection.
    #[error("collection `{collection}` is corrupt: {source}")]
    Corrupt {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },

    #[error("encoding collection `{collection}`: {source}")]
    Encode {
        collection: Collection,
        #[source]
        source: serde_json::Error,
    },

    #[error("locking {path:?}: {source}")]
    Lock {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("commit journal {path:?}: {source}")]
    Journal {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The commit was recorded but `collection` could not be moved into
    /// place. The next access to the store finishes it.
    #[error("commit interrupted at collection `{collection}`: {source}")]
    Interrupted {
        collection: Collection,
        #[source]
        source: std::io::Error,
    },

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("collection `{0}` was not declared for this unit of work")]
    Undeclared(Collection),

    #[error("injected failure on collection `{0}`")]
    Injected(Collection),
}
