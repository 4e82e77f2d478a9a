//! Record upsert policies.

use crate::error::SyncResult;
use mapsync_codec::Record;
use mapsync_store::{DocumentStore, InsertOutcome, StoreResult, UpdateOutcome};

/// How to resolve a record whose identity is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPolicy {
    /// Replace the stored fields with the incoming ones.
    Overwrite,
    /// Keep the stored record untouched.
    Skip,
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new record was stored.
    Inserted,
    /// An existing record was overwritten.
    Updated,
    /// An existing record was kept.
    SkippedDuplicate,
}

/// Writes records into the store, deduplicating on an identity field.
pub trait RecordUpserter {
    /// Stores one record under `policy`.
    ///
    /// A record whose identity field is absent or null is always inserted.
    fn upsert(&self, record: Record, policy: UpsertPolicy) -> SyncResult<UpsertOutcome>;
}

/// Upserts `record` into `collection`, keyed by `identity_field`.
pub fn upsert_record(
    store: &DocumentStore,
    collection: &str,
    identity_field: &str,
    record: Record,
    policy: UpsertPolicy,
) -> StoreResult<UpsertOutcome> {
    let Some(identity) = record.identity(identity_field).cloned() else {
        store.insert(collection, record)?;
        return Ok(UpsertOutcome::Inserted);
    };

    match policy {
        UpsertPolicy::Overwrite => {
            match store.update_one(collection, identity_field, &identity, &record, true)? {
                UpdateOutcome::Updated => Ok(UpsertOutcome::Updated),
                UpdateOutcome::Inserted | UpdateOutcome::NotMatched => Ok(UpsertOutcome::Inserted),
            }
        }
        UpsertPolicy::Skip => {
            match store.insert_if_absent(collection, identity_field, &identity, record)? {
                InsertOutcome::Inserted => Ok(UpsertOutcome::Inserted),
                InsertOutcome::Exists => Ok(UpsertOutcome::SkippedDuplicate),
            }
        }
    }
}
