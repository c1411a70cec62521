// src/services/store.rs
//! Raw snapshot storage.
//!
//! A backend stores one opaque byte snapshot per [`Collection`]. It knows
//! nothing about records; `Records` owns decoding.
//!
//! All access goes through a [`StoreTxn`] obtained from
//! [`RecordStore::begin`]. A transaction holds the backend's exclusive lock
//! until it is committed or dropped, and that lock is shared by every handle
//! (and every process) opened on the same data.
//!
//! - `read` returns `Ok(None)` for a collection that was never written.
//! - `commit` applies the whole batch or none of it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Persisted collections. Declaration order is the lock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Promises,
    DeleteRequests,
    Sessions,
    Stats,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Users,
        Collection::Promises,
        Collection::DeleteRequests,
        Collection::Sessions,
        Collection::Stats,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Promises => "promises",
            Collection::DeleteRequests => "delete_requests",
            Collection::Sessions => "sessions",
            Collection::Stats => "stats",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Durable keyed snapshot store.
pub trait RecordStore: Send + Sync {
    /// Take the store-wide write lock. Blocks while another handle holds it.
    fn begin(&self) -> StorageResult<Box<dyn StoreTxn + '_>>;

    /// Current snapshot, or `None` if the collection was never initialized.
    fn read(&self, collection: Collection) -> StorageResult<Option<Vec<u8>>> {
        self.begin()?.read(collection)
    }

    /// Atomically replace one snapshot.
    fn write(&self, collection: Collection, bytes: &[u8]) -> StorageResult<()> {
        self.begin()?.commit(&[(collection, bytes.to_vec())])
    }
}

/// An open, locked transaction. Dropping it without `commit` writes nothing.
pub trait StoreTxn {
    fn read(&mut self, collection: Collection) -> StorageResult<Option<Vec<u8>>>;

    /// Replace every snapshot in `batch`, or none of them, then release the lock.
    fn commit(self: Box<Self>, batch: &[(Collection, Vec<u8>)]) -> StorageResult<()>;
}

// ---------- file backend ----------

const LOCK_FILE: &str = ".lock";
const JOURNAL_FILE: &str = "commit.journal";
const STAGED_SUFFIX: &str = ".staged";
const TMP_SUFFIX: &str = ".tmp";

/// One `<collection>.json` file per collection under `dir`.
///
/// Commit protocol, all under an exclusive `flock` on `dir/.lock`:
///
/// 1. every new snapshot is written and fsynced to its own
///    `<collection>.<random>.staged` file;
/// 2. `commit.journal` (the list of staged files) is written atomically;
///    this is the commit point;
/// 3. staged files are renamed over their targets, then the journal is removed.
///
/// `begin` replays a leftover journal and deletes unreferenced staged files
/// before handing out the transaction, so a crash at any step leaves either
/// the old or the new state.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    collection: Collection,
    staged: String,
}

impl FileStore {
    /// Open (and create if missing) the data directory.
    pub fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Open {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, collection: Collection) -> PathBuf {
        self.dir.join(format!("{}.json", collection.name()))
    }

    fn journal_path(&self) -> PathBuf {
        self.dir.join(JOURNAL_FILE)
    }

    fn lock(&self) -> StorageResult<fs::File> {
        let path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| StorageError::Lock {
                path: path.clone(),
                source,
            })?;
        // Released when the handle is closed.
        fs2::FileExt::lock_exclusive(&file).map_err(|source| StorageError::Lock { path, source })?;
        Ok(file)
    }

    fn read_file(&self, collection: Collection) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(collection)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { collection, source }),
        }
    }

    /// Finish a recorded commit, if any, and clear leftovers of unrecorded ones.
    fn recover(&self) -> StorageResult<()> {
        let journal = self.journal_path();
        match fs::read(&journal) {
            Ok(bytes) => {
                let entries: Vec<JournalEntry> =
                    serde_json::from_slice(&bytes).map_err(|e| StorageError::Journal {
                        path: journal.clone(),
                        source: io::Error::new(ErrorKind::InvalidData, e),
                    })?;
                tracing::warn!(
                    dir = %self.dir.display(),
                    collections = entries.len(),
                    "finishing interrupted commit"
                );
                self.apply(&entries)?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(StorageError::Journal { path: journal, source }),
        }
        self.sweep().map_err(|source| StorageError::Open {
            path: self.dir.clone(),
            source,
        })
    }

    /// Move every journaled file into place and retire the journal.
    fn apply(&self, entries: &[JournalEntry]) -> StorageResult<()> {
        for entry in entries {
            match fs::rename(self.dir.join(&entry.staged), self.path_for(entry.collection)) {
                Ok(()) => {}
                // moved by an earlier attempt
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(StorageError::Interrupted {
                        collection: entry.collection,
                        source,
                    });
                }
            }
        }
        let journal = self.journal_path();
        sync_dir(&self.dir)
            .and_then(|()| fs::remove_file(&journal))
            .map_err(|source| StorageError::Journal { path: journal, source })
    }

    fn stage(&self, collection: Collection, bytes: &[u8]) -> io::Result<String> {
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!("{}.", collection.name()))
            .suffix(STAGED_SUFFIX)
            .tempfile_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        let (_, path) = tmp.keep().map_err(|e| e.error)?;
        Ok(file_name(&path))
    }

    /// Remove staged and temporary files no journal refers to.
    fn sweep(&self) -> io::Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let name = file_name(&path);
            if name.ends_with(STAGED_SUFFIX) || name.ends_with(TMP_SUFFIX) {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn begin(&self) -> StorageResult<Box<dyn StoreTxn + '_>> {
        let lock = self.lock()?;
        self.recover()?;
        Ok(Box::new(FileTxn {
            store: self,
            _lock: lock,
        }))
    }
}

struct FileTxn<'a> {
    store: &'a FileStore,
    _lock: fs::File,
}

impl StoreTxn for FileTxn<'_> {
    fn read(&mut self, collection: Collection) -> StorageResult<Option<Vec<u8>>> {
        self.store.read_file(collection)
    }

    fn commit(self: Box<Self>, batch: &[(Collection, Vec<u8>)]) -> StorageResult<()> {
        let store = self.store;
        let mut entries = Vec::with_capacity(batch.len());
        for (collection, bytes) in batch {
            match store.stage(*collection, bytes) {
                Ok(staged) => entries.push(JournalEntry {
                    collection: *collection,
                    staged,
                }),
                Err(source) => {
                    discard(store);
                    return Err(StorageError::Io {
                        collection: *collection,
                        source,
                    });
                }
            }
        }

        let journal = store.journal_path();
        let recorded = serde_json::to_vec(&entries)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
            .and_then(|body| write_atomic(&journal, &body));
        if let Err(source) = recorded {
            discard(store);
            return Err(StorageError::Journal { path: journal, source });
        }

        store.apply(&entries)
    }
}

fn discard(store: &FileStore) {
    if let Err(err) = store.sweep() {
        tracing::warn!(dir = %store.dir.display(), error = %err, "could not remove staged files");
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    fs::File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

/// Write to a uniquely named sibling, fsync, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!("{}.", file_name(path)))
        .suffix(TMP_SUFFIX)
        .tempfile_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------- in-memory backend ----------

/// In-memory store for tests. Can be told to fail the next commit touching a
/// collection, which is how abort paths get exercised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    gate: Mutex<()>,
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    snapshots: HashMap<Collection, Vec<u8>>,
    fail_next_write: HashSet<Collection>,
    writes: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next commit that includes `collection` returns
    /// `StorageError::Injected` and applies nothing.
    pub fn fail_next_write(&self, collection: Collection) {
        self.inner().fail_next_write.insert(collection);
    }

    /// Plant raw bytes, bypassing any encoding. Used to simulate corruption.
    pub fn plant(&self, collection: Collection, bytes: &[u8]) {
        self.inner().snapshots.insert(collection, bytes.to_vec());
    }

    pub fn raw(&self, collection: Collection) -> Option<Vec<u8>> {
        self.inner().snapshots.get(&collection).cloned()
    }

    /// Snapshots written by successful commits so far.
    pub fn write_count(&self) -> u64 {
        self.inner().writes
    }

    fn inner(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for MemoryStore {
    fn begin(&self) -> StorageResult<Box<dyn StoreTxn + '_>> {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(Box::new(MemoryTxn {
            store: self,
            _gate: gate,
        }))
    }
}

struct MemoryTxn<'a> {
    store: &'a MemoryStore,
    _gate: MutexGuard<'a, ()>,
}

impl StoreTxn for MemoryTxn<'_> {
    fn read(&mut self, collection: Collection) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.store.raw(collection))
    }

    fn commit(self: Box<Self>, batch: &[(Collection, Vec<u8>)]) -> StorageResult<()> {
        let mut inner = self.store.inner();
        let injected = batch
            .iter()
            .map(|(c, _)| *c)
            .find(|c| inner.fail_next_write.contains(c));
        if let Some(collection) = injected {
            inner.fail_next_write.remove(&collection);
            return Err(StorageError::Injected(collection));
        }
        for (collection, bytes) in batch {
            inner.snapshots.insert(*collection, bytes.clone());
        }
        inner.writes += batch.len() as u64;
        Ok(())
    }
}
