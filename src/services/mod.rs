// src/services/mod.rs

pub mod aggregation;  // full-scan GlobalStats
pub mod audit;        // JSONL action log
pub mod lifecycle;    // promise create / status / progress
pub mod moderation;   // delete-request state machine
pub mod records;      // typed, locked units of work over a RecordStore
pub mod reputation;   // pure outcome -> user transform
pub mod sessions;     // anonymous visit tracking
pub mod sqlite;       // SQLite snapshot backend
pub mod store;        // RecordStore trait, file + memory backends
pub mod users;        // read-only user queries
pub mod validation;

// Public API
pub use audit::AuditLog;
pub use lifecycle::PromiseLifecycle;
pub use moderation::Moderation;
pub use records::{Records, UnitOfWork};
pub use sessions::SessionTracker;
pub use sqlite::SqliteStore;
pub use store::{Collection, FileStore, MemoryStore, RecordStore, StoreTxn};
pub use users::UserDirectory;
