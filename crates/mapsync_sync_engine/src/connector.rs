//! Store connection lifecycle.

use crate::config::StoreLayout;
use crate::cursor::{self, CursorMode, CursorStore, CursorValue, CURSOR_NAME_FIELD};
use crate::error::{SyncError, SyncResult};
use crate::upsert::{upsert_record, RecordUpserter, UpsertOutcome, UpsertPolicy};
use mapsync_codec::Record;
use mapsync_store::{DocumentStore, StoreConfig, StoreError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// An open connection to the store for the length of one run.
pub trait SyncStore: CursorStore + RecordUpserter {
    /// Ends the connection.
    fn close(self) -> SyncResult<()>;
}

/// Opens store connections.
pub trait StoreConnector: Send + Sync {
    /// The connection type.
    type Store: SyncStore;

    /// Opens a connection.
    fn connect(&self) -> SyncResult<Self::Store>;
}

#[derive(Debug, Clone)]
enum Target {
    Path { path: PathBuf, config: StoreConfig },
    Shared(Arc<DocumentStore>),
}

/// Connects to a [`DocumentStore`].
///
/// A path connector opens the store on every run and closes it afterwards,
/// so the directory lock is held only while a run is active. A shared
/// connector reuses an open store and only syncs it on close.
#[derive(Debug, Clone)]
pub struct DocumentStoreConnector {
    target: Target,
    layout: StoreLayout,
}

impl DocumentStoreConnector {
    /// Connects by opening the store at `path` for each run.
    pub fn open_path(path: impl Into<PathBuf>, config: StoreConfig) -> Self {
        Self {
            target: Target::Path {
                path: path.into(),
                config,
            },
            layout: StoreLayout::default(),
        }
    }

    /// Connects to an already-open store.
    pub fn shared(store: Arc<DocumentStore>) -> Self {
        Self {
            target: Target::Shared(store),
            layout: StoreLayout::default(),
        }
    }

    /// Sets the collection layout.
    pub fn with_layout(mut self, layout: StoreLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Returns the collection layout.
    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }
}

impl StoreConnector for DocumentStoreConnector {
    type Store = DocumentSession;

    fn connect(&self) -> SyncResult<DocumentSession> {
        let (store, owned) = match &self.target {
            Target::Path { path, config } => {
                let store = DocumentStore::open(path, config.clone())?;
                (Arc::new(store), true)
            }
            Target::Shared(store) => (Arc::clone(store), false),
        };
        DocumentSession::new(store, self.layout.clone(), owned)
    }
}

/// A connection to a [`DocumentStore`].
#[derive(Debug)]
pub struct DocumentSession {
    store: Arc<DocumentStore>,
    layout: StoreLayout,
    owned: bool,
}

impl DocumentSession {
    fn new(store: Arc<DocumentStore>, layout: StoreLayout, owned: bool) -> SyncResult<Self> {
        store.create_index(&layout.profiles, &layout.identity_field)?;
        store.create_index(&layout.settings, CURSOR_NAME_FIELD)?;
        Ok(Self {
            store,
            layout,
            owned,
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }
}

impl CursorStore for DocumentSession {
    fn read_cursor(&self, name: &str, mode: CursorMode) -> SyncResult<CursorValue> {
        cursor::read_cursor_document(&self.store, &self.layout.settings, name, mode)
    }

    fn write_cursor(&self, name: &str, value: &CursorValue) -> SyncResult<()> {
        cursor::write_cursor_document(&self.store, &self.layout.settings, name, value)?;
        self.store.sync()?;
        Ok(())
    }
}

impl RecordUpserter for DocumentSession {
    fn upsert(&self, record: Record, policy: UpsertPolicy) -> SyncResult<UpsertOutcome> {
        Ok(upsert_record(
            &self.store,
            &self.layout.profiles,
            &self.layout.identity_field,
            record,
            policy,
        )?)
    }
}

impl SyncStore for DocumentSession {
    fn close(self) -> SyncResult<()> {
        if self.owned {
            debug!("closing document store");
            self.store.close()?;
        } else {
            self.store.sync()?;
        }
        Ok(())
    }
}

/// Operations a [`MemorySyncStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `connect` fails.
    Connect,
    /// `read_cursor` fails with a store error.
    ReadCursor,
    /// The upsert with this zero-based index fails.
    Upsert(usize),
    /// `write_cursor` fails.
    WriteCursor,
    /// `close` fails.
    Close,
}

#[derive(Debug, Default)]
struct Counters {
    connects: usize,
    closes: usize,
    upserts: usize,
    cursor_writes: usize,
}

/// An in-memory store for testing, with fault injection.
///
/// Clones share state, so a test can keep a handle while the driver owns
/// connections.
#[derive(Debug, Clone)]
pub struct MemorySyncStore {
    store: Arc<DocumentStore>,
    layout: StoreLayout,
    faults: Arc<Mutex<Vec<Fault>>>,
    counters: Arc<Mutex<Counters>>,
}

impl MemorySyncStore {
    /// Creates an empty store with the default layout.
    pub fn new() -> Self {
        Self::with_layout(StoreLayout::default())
    }

    /// Creates an empty store with the given layout.
    pub fn with_layout(layout: StoreLayout) -> Self {
        let store = Arc::new(DocumentStore::open_in_memory());
        Self {
            store,
            layout,
            faults: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    /// Arms a fault. It stays armed until cleared.
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().push(fault);
    }

    /// Disarms all faults.
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    fn check(&self, fault: Fault) -> SyncResult<()> {
        if self.faults.lock().contains(&fault) {
            return Err(SyncError::Store(StoreError::Io(std::io::Error::other(
                format!("injected fault: {fault:?}"),
            ))));
        }
        Ok(())
    }

    /// The backing store, for assertions.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// All stored profiles in insertion order.
    pub fn records(&self) -> Vec<Record> {
        self.store
            .documents(&self.layout.profiles)
            .map(|docs| docs.into_iter().map(|d| d.record).collect())
            .unwrap_or_default()
    }

    /// Reads the cursor without going through a connection.
    pub fn cursor(&self, name: &str, mode: CursorMode) -> Option<CursorValue> {
        cursor::read_cursor_document(&self.store, &self.layout.settings, name, mode).ok()
    }

    /// Seeds a cursor. Not counted as a cursor write and ignores faults.
    pub fn set_cursor(&self, name: &str, value: &CursorValue) -> SyncResult<()> {
        cursor::write_cursor_document(&self.store, &self.layout.settings, name, value)
    }

    /// Number of successful connects.
    pub fn connects(&self) -> usize {
        self.counters.lock().connects
    }

    /// Number of close calls, failed or not.
    pub fn closes(&self) -> usize {
        self.counters.lock().closes
    }

    /// Number of upsert calls, failed or not.
    pub fn upserts(&self) -> usize {
        self.counters.lock().upserts
    }

    /// Number of successful cursor writes.
    pub fn cursor_writes(&self) -> usize {
        self.counters.lock().cursor_writes
    }
}

impl Default for MemorySyncStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreConnector for MemorySyncStore {
    type Store = MemorySyncStore;

    fn connect(&self) -> SyncResult<MemorySyncStore> {
        self.check(Fault::Connect)?;
        self.counters.lock().connects += 1;
        Ok(self.clone())
    }
}

impl CursorStore for MemorySyncStore {
    fn read_cursor(&self, name: &str, mode: CursorMode) -> SyncResult<CursorValue> {
        self.check(Fault::ReadCursor)?;
        cursor::read_cursor_document(&self.store, &self.layout.settings, name, mode)
    }

    fn write_cursor(&self, name: &str, value: &CursorValue) -> SyncResult<()> {
        self.check(Fault::WriteCursor)?;
        cursor::write_cursor_document(&self.store, &self.layout.settings, name, value)?;
        self.counters.lock().cursor_writes += 1;
        Ok(())
    }
}

impl RecordUpserter for MemorySyncStore {
    fn upsert(&self, record: Record, policy: UpsertPolicy) -> SyncResult<UpsertOutcome> {
        let index = {
            let mut counters = self.counters.lock();
            counters.upserts += 1;
            counters.upserts - 1
        };
        self.check(Fault::Upsert(index))?;
        Ok(upsert_record(
            &self.store,
            &self.layout.profiles,
            &self.layout.identity_field,
            record,
            policy,
        )?)
    }
}

impl SyncStore for MemorySyncStore {
    fn close(self) -> SyncResult<()> {
        self.counters.lock().closes += 1;
        self.check(Fault::Close)
    }
}
