//! Inspect command implementation.

use mapsync_codec::{Record, Value};
use mapsync_store::{DocumentStore, StoreConfig};
use mapsync_sync_engine::{StoreLayout, SyncConfig, CURSOR_NAME_FIELD};
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Mutation log size in bytes.
    pub log_size: u64,
    /// Per-collection statistics.
    pub collections: Vec<CollectionStats>,
    /// The stored cursor document, if any.
    pub cursor: Option<Record>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Number of documents.
    pub documents: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics for the store at `path`.
///
/// Fails while a sync run holds the store.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let store = DocumentStore::open(path, StoreConfig::new().create_if_missing(false))?;
    let layout = StoreLayout::default();
    let cursor_name = SyncConfig::default().cursor_name;

    let mut collections = Vec::new();
    for name in store.collections()? {
        let documents = store.count(&name)?;
        collections.push(CollectionStats { name, documents });
    }
    let cursor = store
        .find_one(&layout.settings, CURSOR_NAME_FIELD, &Value::from(cursor_name))?
        .map(|doc| doc.record);
    store.close()?;

    let log_size = std::fs::metadata(path.join("documents.log"))
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(InspectResult {
        path: path.display().to_string(),
        log_size,
        collections,
        cursor,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!("Log size: {} bytes", result.log_size);
    println!();
    println!("Collections:");
    if result.collections.is_empty() {
        println!("  (none)");
    }
    for stats in &result.collections {
        println!("  {}: {} documents", stats.name, stats.documents);
    }
    println!();
    match &result.cursor {
        Some(cursor) => {
            println!("Cursor:");
            for (field, value) in cursor.iter() {
                println!("  {field}: {value}");
            }
        }
        None => println!("Cursor: (none)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapsync_sync_engine::{write_cursor_document, CursorValue};
    use mapsync_testkit::prelude::*;

    #[test]
    fn reports_collections_and_cursor() {
        with_store_dir(|path| {
            let store = DocumentStore::open(path, StoreConfig::default()).unwrap();
            store.insert("profiles", profile("a")).unwrap();
            store.insert("profiles", profile("b")).unwrap();
            write_cursor_document(
                &store,
                "settings",
                "current",
                &CursorValue::SortToken("T1".into()),
            )
            .unwrap();
            store.close().unwrap();
            drop(store);

            let result = inspect(path).unwrap();
            let counts: Vec<_> = result
                .collections
                .iter()
                .map(|c| (c.name.as_str(), c.documents))
                .collect();
            assert_eq!(counts, vec![("profiles", 2), ("settings", 1)]);
            assert!(result.log_size > 0);
            let cursor = result.cursor.unwrap();
            assert_eq!(cursor.get("sort"), Some(&Value::from(r#""T1""#)));
        });
    }

    #[test]
    fn missing_store_is_an_error() {
        with_store_dir(|path| {
            assert!(inspect(path).is_err());
            assert!(!path.exists());
        });
    }

    #[test]
    fn locked_store_is_an_error() {
        let test_store = TestStore::file();
        let path = test_store.path().unwrap();
        assert!(inspect(&path).is_err());
    }
}
