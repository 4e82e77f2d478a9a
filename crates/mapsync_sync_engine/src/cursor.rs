//! Sync cursors and their persistence.
//!
//! A cursor is stored as one document in the settings collection:
//!
//! ```text
//! { "name": "current", "sort": "<token JSON text>", "last_updated": <unix seconds> }
//! ```
//!
//! The sort token is kept as the exact JSON text the upstream sent, so it
//! goes back out byte-for-byte.
//!
//! Only the field for the active mode is read or written, so both modes can
//! share a cursor name without clobbering each other.

use crate::error::{SyncError, SyncResult};
use mapsync_codec::{Record, Value};
use mapsync_store::DocumentStore;
use serde_json::value::RawValue;
use std::fmt;
use std::str::FromStr;

/// Field holding the cursor name.
pub const CURSOR_NAME_FIELD: &str = "name";
/// Field holding a sort token.
pub const SORT_FIELD: &str = "sort";
/// Field holding a timestamp.
pub const LAST_UPDATED_FIELD: &str = "last_updated";

/// Which cursor semantics a sync run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CursorMode {
    /// Opaque upstream sort token, drained until an empty page.
    #[default]
    SortToken,
    /// Modified-since timestamp, drained until the continuation link is null.
    Timestamp,
}

impl CursorMode {
    /// Field the cursor value is stored under.
    pub fn field(self) -> &'static str {
        match self {
            Self::SortToken => SORT_FIELD,
            Self::Timestamp => LAST_UPDATED_FIELD,
        }
    }
}

impl fmt::Display for CursorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SortToken => f.write_str("sort-token"),
            Self::Timestamp => f.write_str("timestamp"),
        }
    }
}

impl FromStr for CursorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sort-token" | "sort_token" | "sort" => Ok(Self::SortToken),
            "timestamp" | "last-updated" | "last_updated" => Ok(Self::Timestamp),
            other => Err(format!(
                "unknown sync mode '{other}', expected 'sort-token' or 'timestamp'"
            )),
        }
    }
}

/// Opaque ordering token issued by the upstream.
///
/// Holds the raw JSON text of `meta.sort`, so large integers and float
/// spellings survive the trip to the store and back into the next request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortToken(String);

impl SortToken {
    /// The token sent before anything has been synced.
    pub fn null() -> Self {
        Self("null".to_string())
    }

    /// Wraps JSON text, rejecting anything that is not a single JSON value.
    pub fn from_json(text: &str) -> SyncResult<Self> {
        let raw: &RawValue = serde_json::from_str(text)
            .map_err(|e| SyncError::decode(format!("sort token is not JSON: {e}")))?;
        Ok(Self::from_raw(raw))
    }

    pub(crate) fn from_raw(raw: &RawValue) -> Self {
        Self(raw.get().to_string())
    }

    /// The token's JSON text.
    pub fn as_json(&self) -> &str {
        &self.0
    }

    /// Returns true for the JSON `null` token.
    pub fn is_null(&self) -> bool {
        self.0.trim() == "null"
    }
}

impl Default for SortToken {
    fn default() -> Self {
        Self::null()
    }
}

impl From<Value> for SortToken {
    fn from(value: Value) -> Self {
        match serde_json::to_string(&value) {
            Ok(text) => Self(text),
            Err(_) => Self::null(),
        }
    }
}

impl From<&str> for SortToken {
    fn from(token: &str) -> Self {
        Self::from(Value::from(token))
    }
}

impl From<String> for SortToken {
    fn from(token: String) -> Self {
        Self::from(Value::from(token))
    }
}

impl fmt::Display for SortToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How far sync has progressed.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorValue {
    /// Token issued by the upstream, round-tripped unchanged.
    SortToken(SortToken),
    /// Unix time (seconds) of the start of the last completed run.
    Timestamp(i64),
}

impl CursorValue {
    /// The cursor used when none has been persisted.
    pub fn zero(mode: CursorMode) -> Self {
        match mode {
            CursorMode::SortToken => Self::SortToken(SortToken::null()),
            CursorMode::Timestamp => Self::Timestamp(0),
        }
    }

    /// The mode this cursor belongs to.
    pub fn mode(&self) -> CursorMode {
        match self {
            Self::SortToken(_) => CursorMode::SortToken,
            Self::Timestamp(_) => CursorMode::Timestamp,
        }
    }

    /// Returns true for the zero cursor of either mode.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::SortToken(token) => token.is_null(),
            Self::Timestamp(ts) => *ts <= 0,
        }
    }

    /// The stored representation of this cursor.
    pub fn to_value(&self) -> Value {
        match self {
            Self::SortToken(token) => Value::Text(token.as_json().to_string()),
            Self::Timestamp(ts) => Value::Integer(*ts),
        }
    }

    fn from_value(name: &str, mode: CursorMode, value: &Value) -> SyncResult<Self> {
        match mode {
            CursorMode::SortToken => match value {
                Value::Null => Ok(Self::SortToken(SortToken::null())),
                Value::Text(text) => SortToken::from_json(text)
                    .map(Self::SortToken)
                    .map_err(|_| SyncError::InvalidCursor {
                        name: name.to_string(),
                        message: "sort must hold the token's JSON text".to_string(),
                    }),
                other => Ok(Self::SortToken(SortToken::from(other.clone()))),
            },
            CursorMode::Timestamp => match value {
                Value::Null => Ok(Self::Timestamp(0)),
                Value::Integer(ts) => Ok(Self::Timestamp(*ts)),
                Value::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                    Ok(Self::Timestamp(*f as i64))
                }
                other => Err(SyncError::InvalidCursor {
                    name: name.to_string(),
                    message: format!("last_updated must be an integer, found {}", other.type_name()),
                }),
            },
        }
    }
}

impl fmt::Display for CursorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SortToken(token) => write!(f, "{token}"),
            Self::Timestamp(ts) => write!(f, "{ts}"),
        }
    }
}

/// Durable holder of named cursors.
pub trait CursorStore {
    /// Reads the cursor stored under `name` for `mode`.
    ///
    /// Fails with [`SyncError::CursorNotFound`] if it was never written.
    fn read_cursor(&self, name: &str, mode: CursorMode) -> SyncResult<CursorValue>;

    /// Creates or overwrites the cursor. Durable once this returns.
    fn write_cursor(&self, name: &str, cursor: &CursorValue) -> SyncResult<()>;
}

/// Reads a cursor document from `collection`.
pub fn read_cursor_document(
    store: &DocumentStore,
    collection: &str,
    name: &str,
    mode: CursorMode,
) -> SyncResult<CursorValue> {
    let not_found = || SyncError::CursorNotFound {
        name: name.to_string(),
    };

    let doc = store
        .find_one(collection, CURSOR_NAME_FIELD, &Value::from(name))?
        .ok_or_else(not_found)?;
    let value = doc.record.get(mode.field()).ok_or_else(not_found)?;
    CursorValue::from_value(name, mode, value)
}

/// Writes a cursor document into `collection`, keeping the other mode's field.
pub fn write_cursor_document(
    store: &DocumentStore,
    collection: &str,
    name: &str,
    cursor: &CursorValue,
) -> SyncResult<()> {
    let set = Record::new().with(cursor.mode().field(), cursor.to_value());
    store.update_one(collection, CURSOR_NAME_FIELD, &Value::from(name), &set, true)?;
    Ok(())
}
