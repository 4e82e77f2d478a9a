//! # mapsync Sync Engine
//!
//! Incremental mirroring of upstream profile records into the local
//! document store.
//!
//! This crate provides:
//! - Cursor persistence (sort token or timestamp)
//! - Page fetching over HTTP
//! - Record upsert with overwrite or skip-duplicate policies
//! - The sync driver state machine tying them together
//!
//! ## Run shape
//!
//! ```text
//! Idle → Connecting → ReadingCursor → Draining → AdvancingCursor → Disconnecting → Done
//!                                 ↘ Failed (from any active state)
//! ```
//!
//! ## Key Invariants
//!
//! - The cursor advances only after every page of the run is upserted
//! - A failed run leaves the cursor where it was
//! - Upserts are idempotent, so re-running after a failure is safe
//! - No retries inside the engine; the trigger is re-invocable instead

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connector;
mod cursor;
mod error;
mod fetcher;
mod http;
mod state;
mod upsert;

pub use config::{FetcherConfig, StoreLayout, SyncConfig};
pub use connector::{
    DocumentSession, DocumentStoreConnector, Fault, MemorySyncStore, StoreConnector, SyncStore,
};
pub use cursor::{
    read_cursor_document, write_cursor_document, CursorMode, CursorStore, CursorValue, SortToken,
    CURSOR_NAME_FIELD, LAST_UPDATED_FIELD, SORT_FIELD,
};
pub use error::{SyncError, SyncResult, TransportErrorKind};
pub use fetcher::{FetchCall, Page, PageFetcher, ScriptedFetcher};
pub use http::{HttpClient, HttpPageFetcher, ReqwestClient};
pub use state::{Clock, ManualClock, SyncDriver, SyncReport, SyncState, SyncStats, SystemClock};
pub use upsert::{upsert_record, RecordUpserter, UpsertOutcome, UpsertPolicy};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
