// src/services/records.rs
//! Typed, locked access to the snapshot store.
//!
//! Every mutation runs inside a [`UnitOfWork`]:
//!
//! 1. `Records::begin` takes the per-collection locks for the declared
//!    collections, always in [`Collection`] order, then opens one store
//!    transaction. The transaction holds the store-wide lock that other
//!    handles and processes on the same data also take.
//! 2. Snapshots are loaded lazily on first access and edited in memory.
//! 3. `commit` encodes every dirty snapshot and hands the backend a single
//!    batch, which it applies whole or not at all.
//!
//! Dropping a unit without committing discards its edits. Readers go through
//! the same locks, so nobody observes half of a unit's writes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StorageError, StorageResult};
use crate::models::{DeleteRequest, GlobalStats, Promise, Session, User};
use crate::services::store::{Collection, RecordStore, StoreTxn};

pub struct Records {
    store: Arc<dyn RecordStore>,
    locks: [Mutex<()>; 5],
}

impl Records {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            locks: Default::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Start a unit of work over `collections` (order and duplicates don't matter).
    pub fn begin(&self, collections: &[Collection]) -> StorageResult<UnitOfWork<'_>> {
        let mut declared = collections.to_vec();
        declared.sort();
        declared.dedup();
        let guards = declared
            .into_iter()
            .map(|c| (c, self.lock(c)))
            .collect();
        // store lock last, once every collection lock is held
        let txn = self.store.begin()?;
        Ok(UnitOfWork {
            txn,
            guards,
            users: Slot::default(),
            promises: Slot::default(),
            delete_requests: Slot::default(),
            sessions: Slot::default(),
            stats: Slot::default(),
        })
    }

    /// Locked read of one collection. Uninitialized reads as `T::default()`.
    pub fn read<T: DeserializeOwned + Default>(&self, collection: Collection) -> StorageResult<T> {
        let _guard = self.lock(collection);
        let raw = self.store.read(collection)?;
        decode(collection, raw.as_deref())
    }

    // A poisoned lock only means another unit panicked before committing;
    // nothing it staged was written, so the lock is still usable.
    fn lock(&self, collection: Collection) -> MutexGuard<'_, ()> {
        self.locks[collection.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn decode<T: DeserializeOwned + Default>(collection: Collection, raw: Option<&[u8]>) -> StorageResult<T> {
    match raw {
        None => Ok(T::default()),
        Some(bytes) => serde_json::from_slice(bytes)
            .map_err(|source| StorageError::Corrupt { collection, source }),
    }
}

struct Slot<T> {
    value: Option<T>,
    dirty: bool,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            dirty: false,
        }
    }
}

impl<T: Serialize + DeserializeOwned + Default> Slot<T> {
    fn load(&mut self, txn: &mut dyn StoreTxn, collection: Collection) -> StorageResult<&mut T> {
        if self.value.is_none() {
            let raw = txn.read(collection)?;
            self.value = Some(decode(collection, raw.as_deref())?);
        }
        // just populated above
        Ok(self.value.get_or_insert_with(T::default))
    }

    fn staged(&self, collection: Collection) -> StorageResult<Option<(Collection, Vec<u8>)>> {
        match (&self.value, self.dirty) {
            (Some(value), true) => serde_json::to_vec_pretty(value)
                .map(|bytes| Some((collection, bytes)))
                .map_err(|source| StorageError::Encode { collection, source }),
            _ => Ok(None),
        }
    }
}

pub struct UnitOfWork<'a> {
    // declared first so the store lock is released before the collection locks
    txn: Box<dyn StoreTxn + 'a>,
    guards: Vec<(Collection, MutexGuard<'a, ()>)>,
    users: Slot<Vec<User>>,
    promises: Slot<Vec<Promise>>,
    delete_requests: Slot<Vec<DeleteRequest>>,
    sessions: Slot<Vec<Session>>,
    stats: Slot<GlobalStats>,
}

macro_rules! accessors {
    ($get:ident, $get_mut:ident, $field:ident, $collection:expr, $ty:ty) => {
        pub fn $get(&mut self) -> StorageResult<&$ty> {
            self.ensure_declared($collection)?;
            self.$field
                .load(self.txn.as_mut(), $collection)
                .map(|v| &*v)
        }

        pub fn $get_mut(&mut self) -> StorageResult<&mut $ty> {
            self.ensure_declared($collection)?;
            self.$field.dirty = true;
            self.$field.load(self.txn.as_mut(), $collection)
        }
    };
}

impl<'a> UnitOfWork<'a> {
    accessors!(users, users_mut, users, Collection::Users, Vec<User>);
    accessors!(promises, promises_mut, promises, Collection::Promises, Vec<Promise>);
    accessors!(
        delete_requests,
        delete_requests_mut,
        delete_requests,
        Collection::DeleteRequests,
        Vec<DeleteRequest>
    );
    accessors!(sessions, sessions_mut, sessions, Collection::Sessions, Vec<Session>);
    accessors!(stats, stats_mut, stats, Collection::Stats, GlobalStats);

    fn ensure_declared(&self, collection: Collection) -> StorageResult<()> {
        if self.guards.iter().any(|(c, _)| *c == collection) {
            Ok(())
        } else {
            Err(StorageError::Undeclared(collection))
        }
    }

    /// Persist every dirty collection, or none of them.
    pub fn commit(self) -> StorageResult<()> {
        // Encode everything first so a serialization failure writes nothing.
        let batch: Vec<(Collection, Vec<u8>)> = [
            self.users.staged(Collection::Users)?,
            self.promises.staged(Collection::Promises)?,
            self.delete_requests.staged(Collection::DeleteRequests)?,
            self.sessions.staged(Collection::Sessions)?,
            self.stats.staged(Collection::Stats)?,
        ]
        .into_iter()
        .flatten()
        .collect();
        if batch.is_empty() {
            return Ok(());
        }

        if let Err(err) = self.txn.commit(&batch) {
            tracing::warn!(
                collections = batch.len(),
                error = %err,
                "unit of work failed to commit"
            );
            return Err(err);
        }
        tracing::debug!(collections = batch.len(), "unit of work committed");
        Ok(())
    }
}
