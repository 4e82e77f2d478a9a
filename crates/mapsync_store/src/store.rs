//! The document store handle.

use crate::backend::{FileLog, LogBackend, MemoryLog};
use crate::collection::Collection;
use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::document::{Document, DocumentId};
use crate::error::{StoreError, StoreResult};
use crate::log::{self, LogEntry};
use mapsync_codec::{Record, Value};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Result of [`DocumentStore::update_one`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A matching document was updated.
    Updated,
    /// Nothing matched and a new document was inserted.
    Inserted,
    /// Nothing matched and upsert was off.
    NotMatched,
}

/// Result of [`DocumentStore::insert_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was inserted.
    Inserted,
    /// A document with the same key already existed; nothing was written.
    Exists,
}

struct Inner {
    collections: BTreeMap<String, Collection>,
    log: Box<dyn LogBackend>,
    dir: Option<StoreDir>,
    closed: bool,
}

impl Inner {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn apply(&mut self, entry: LogEntry) -> StoreResult<()> {
        match entry {
            LogEntry::Put {
                collection,
                id,
                record,
            } => self.collections.entry(collection).or_default().put(id, record),
        }
    }
}

/// An embedded document store backed by an append-only mutation log.
///
/// All state lives in memory and is rebuilt from the log on open. Every
/// mutation is appended to the log before it becomes visible.
///
/// # Concurrency
///
/// The handle is `Send + Sync`. Mutations hold the write lock for the whole
/// read-modify-write, so [`update_one`](Self::update_one) and
/// [`insert_if_absent`](Self::insert_if_absent) are atomic with respect to
/// other callers sharing the handle. Other processes are kept out by the
/// directory lock.
pub struct DocumentStore {
    inner: RwLock<Inner>,
    config: StoreConfig,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("DocumentStore")
            .field("path", &inner.dir.as_ref().map(StoreDir::path))
            .field("collections", &inner.collections.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

impl DocumentStore {
    /// Opens the store at `path`, taking its directory lock and replaying
    /// the log.
    ///
    /// # Errors
    ///
    /// - `Locked` if another handle has the store open
    /// - `Corrupted` if the log is damaged before its final frame
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let dir = StoreDir::open(path.as_ref(), config.create_if_missing)?;
        let log = FileLog::open(&dir.log_path())?;
        let store = Self::build(Box::new(log), Some(dir), config)?;
        info!(path = %path.as_ref().display(), "opened document store");
        Ok(store)
    }

    /// Opens an ephemeral store with nothing on disk.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner {
                collections: BTreeMap::new(),
                log: Box::new(MemoryLog::new()),
                dir: None,
                closed: false,
            }),
            config: StoreConfig::default(),
        }
    }

    /// Opens a store over an arbitrary log backend.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the log is damaged before its final frame.
    pub fn with_backend(backend: Box<dyn LogBackend>, config: StoreConfig) -> StoreResult<Self> {
        Self::build(backend, None, config)
    }

    fn build(
        mut log: Box<dyn LogBackend>,
        dir: Option<StoreDir>,
        config: StoreConfig,
    ) -> StoreResult<Self> {
        let replay = log::replay(log.as_mut())?;
        let entries = replay.entries.len();

        let mut inner = Inner {
            collections: BTreeMap::new(),
            log,
            dir,
            closed: false,
        };
        for entry in replay.entries {
            inner.apply(entry)?;
        }
        debug!(entries, truncated = replay.truncated, "replayed document log");

        Ok(Self {
            inner: RwLock::new(inner),
            config,
        })
    }

    /// Syncs the log and releases the directory lock.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails. The store is closed anyway.
    pub fn close(&self) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;
        let synced = inner.log.sync();
        inner.dir = None;
        synced
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    /// Forces all logged mutations to durable storage.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close, or an I/O error.
    pub fn sync(&self) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        inner.log.sync()
    }

    /// Builds a hash index on `field` in `collection`.
    ///
    /// Indexes live in memory only and speed up [`find_one`](Self::find_one)
    /// on that field. The collection is created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close.
    pub fn create_index(&self, collection: &str, field: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .create_index(field)
    }

    /// Finds the first document in `collection` whose `field` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close.
    pub fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<Option<Document>> {
        let inner = self.inner.read();
        inner.ensure_open()?;
        match inner.collections.get(collection) {
            Some(coll) => Ok(coll.find_one(field, value)?.cloned()),
            None => Ok(None),
        }
    }

    /// Inserts a record as a new document.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close, or an error if the log write fails.
    pub fn insert(&self, collection: &str, record: Record) -> StoreResult<DocumentId> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;
        let id = DocumentId::new();
        self.commit(&mut inner, collection, id, record)?;
        Ok(id)
    }

    /// Applies `set` to the first document whose `field` equals `value`.
    ///
    /// Fields in `set` replace the stored ones; other stored fields are kept.
    /// With `upsert`, a missing document is created as `{field: value}`
    /// followed by `set`.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close, or an error if the log write fails.
    pub fn update_one(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        set: &Record,
        upsert: bool,
    ) -> StoreResult<UpdateOutcome> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;

        let existing = match inner.collections.get(collection) {
            Some(coll) => coll.find_one(field, value)?.cloned(),
            None => None,
        };

        match existing {
            Some(doc) => {
                let mut merged = doc.record.clone();
                merged.merge_from(set);
                if merged != doc.record {
                    self.commit(&mut inner, collection, doc.id, merged)?;
                }
                Ok(UpdateOutcome::Updated)
            }
            None if upsert => {
                let mut record = Record::new().with(field, value.clone());
                record.merge_from(set);
                self.commit(&mut inner, collection, DocumentId::new(), record)?;
                Ok(UpdateOutcome::Inserted)
            }
            None => Ok(UpdateOutcome::NotMatched),
        }
    }

    /// Inserts `record` unless a document whose `field` equals `value`
    /// already exists.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close, or an error if the log write fails.
    pub fn insert_if_absent(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
        record: Record,
    ) -> StoreResult<InsertOutcome> {
        let mut inner = self.inner.write();
        inner.ensure_open()?;

        let exists = match inner.collections.get(collection) {
            Some(coll) => coll.find_one(field, value)?.is_some(),
            None => false,
        };
        if exists {
            return Ok(InsertOutcome::Exists);
        }

        self.commit(&mut inner, collection, DocumentId::new(), record)?;
        Ok(InsertOutcome::Inserted)
    }

    /// Number of documents in `collection`.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close.
    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        let inner = self.inner.read();
        inner.ensure_open()?;
        Ok(inner.collections.get(collection).map_or(0, Collection::len))
    }

    /// All documents in `collection`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close.
    pub fn documents(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let inner = self.inner.read();
        inner.ensure_open()?;
        Ok(inner
            .collections
            .get(collection)
            .map(|coll| coll.documents().to_vec())
            .unwrap_or_default())
    }

    /// Names of all collections, sorted.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after close.
    pub fn collections(&self) -> StoreResult<Vec<String>> {
        let inner = self.inner.read();
        inner.ensure_open()?;
        Ok(inner.collections.keys().cloned().collect())
    }

    fn commit(
        &self,
        inner: &mut Inner,
        collection: &str,
        id: DocumentId,
        record: Record,
    ) -> StoreResult<()> {
        let entry = LogEntry::Put {
            collection: collection.to_string(),
            id,
            record,
        };
        let frame = entry.encode_frame()?;

        inner.log.append(&frame)?;
        if self.config.sync_writes {
            inner.log.sync()?;
        }

        inner.apply(entry)
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
