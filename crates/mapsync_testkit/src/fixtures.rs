//! Test fixtures and store helpers.

use mapsync_codec::{Record, Value};
use mapsync_store::{DocumentStore, StoreConfig};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Identity field used by upstream profiles.
pub const PROFILE_URL: &str = "profile_url";

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: DocumentStore,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            store: DocumentStore::open_in_memory(),
            temp_dir: None,
        }
    }

    /// Creates a new on-disk test store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = DocumentStore::open(temp_dir.path().join("mapdata"), StoreConfig::default())
            .expect("Failed to open file store");
        Self {
            store,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("mapdata"))
    }

    /// Closes the store and reopens it from disk.
    ///
    /// Panics for in-memory stores.
    pub fn reopen(self) -> Self {
        let temp_dir = self.temp_dir.expect("Only file stores can be reopened");
        self.store.close().expect("Failed to close store");
        drop(self.store);
        let store = DocumentStore::open(temp_dir.path().join("mapdata"), StoreConfig::default())
            .expect("Failed to reopen store");
        Self {
            store,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = DocumentStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&DocumentStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary directory for stores to be opened in.
pub fn with_store_dir<F, R>(f: F) -> R
where
    F: FnOnce(&Path) -> R,
{
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    f(&temp_dir.path().join("mapdata"))
}

/// A minimal upstream profile.
pub fn profile(url: &str) -> Record {
    Record::new().with(PROFILE_URL, url)
}

/// A profile with a name, for checking which copy was stored.
pub fn named_profile(url: &str, name: &str) -> Record {
    profile(url).with("name", name)
}

/// Builders for upstream response bodies.
pub mod responses {
    use super::*;

    fn data(records: &[Record]) -> serde_json::Value {
        serde_json::Value::Array(
            records
                .iter()
                .map(|r| serde_json::to_value(r).expect("Record serializes"))
                .collect(),
        )
    }

    /// An export (sort-token) response body.
    pub fn export_page(records: &[Record], sort: Option<Value>) -> String {
        let mut body = serde_json::json!({ "data": data(records), "meta": {} });
        if let Some(sort) = sort {
            body["meta"]["sort"] = serde_json::to_value(&sort).expect("Value serializes");
        }
        body.to_string()
    }

    /// An export response whose `meta.sort` is spliced in as raw JSON text.
    pub fn export_page_with_raw_sort(records: &[Record], sort: &str) -> String {
        format!(r#"{{"data":{},"meta":{{"sort":{sort}}}}}"#, data(records))
    }

    /// A nodes (timestamp) response body.
    pub fn nodes_page(records: &[Record], next: Option<&str>) -> String {
        serde_json::json!({ "data": data(records), "links": { "next": next } }).to_string()
    }
}
