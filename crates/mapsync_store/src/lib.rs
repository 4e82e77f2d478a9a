//! # mapsync Store
//!
//! Embedded document store holding mirrored profiles and sync settings.
//!
//! Documents are [`Record`](mapsync_codec::Record)s grouped into named
//! collections. The store keeps everything in memory and persists each
//! mutation to an append-only, checksummed log inside the store directory:
//!
//! ```text
//! <store_path>/
//! ├─ LOCK            # advisory lock, held while open
//! └─ documents.log   # mutation log
//! ```
//!
//! Only one handle may have a directory open at a time. Opening a locked
//! store fails with [`StoreError::Locked`].
//!
//! ## Usage
//!
//! ```
//! use mapsync_codec::{Record, Value};
//! use mapsync_store::{DocumentStore, UpdateOutcome};
//!
//! let store = DocumentStore::open_in_memory();
//! store.create_index("profiles", "profile_url").unwrap();
//!
//! let key = Value::from("https://example.org/p.json");
//! let set = Record::new().with("profile_url", key.clone()).with("name", "Depot");
//! let outcome = store.update_one("profiles", "profile_url", &key, &set, true).unwrap();
//! assert_eq!(outcome, UpdateOutcome::Inserted);
//! assert_eq!(store.count("profiles").unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod collection;
mod config;
mod dir;
mod document;
mod error;
mod log;
mod store;

pub use backend::{FileLog, LogBackend, MemoryLog};
pub use config::StoreConfig;
pub use document::{Document, DocumentId};
pub use error::{StoreError, StoreResult};
pub use log::{compute_crc32, LogEntry, LOG_MAGIC};
pub use store::{DocumentStore, InsertOutcome, UpdateOutcome};
