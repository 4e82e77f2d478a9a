//! Upstream pages and the fetcher seam.

use crate::cursor::{CursorValue, SortToken};
use crate::error::{SyncError, SyncResult};
use mapsync_codec::{Record, Value};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::collections::VecDeque;

/// One upstream response.
///
/// Wire shape:
///
/// ```text
/// { "data": [ {..}, .. ], "meta": { "sort": <token> }, "links": { "next": <url|null> }, "errors": .. }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Records in upstream order.
    pub records: Vec<Record>,
    /// Next sort token (`meta.sort`), as sent.
    pub sort: Option<SortToken>,
    /// Continuation URL (`links.next`).
    pub next: Option<String>,
    /// Upstream-reported problems (`errors`).
    pub errors: Option<Value>,
}

impl Page {
    /// Creates a page of records with no metadata.
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Builder: sets the sort token.
    pub fn with_sort(mut self, sort: impl Into<SortToken>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Builder: sets the continuation URL.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    /// Builder: sets the errors field.
    pub fn with_errors(mut self, errors: impl Into<Value>) -> Self {
        self.errors = Some(errors.into());
        self
    }

    /// Returns true if the page has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns true if the upstream reported a non-empty `errors` field.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Decodes a page from a JSON response body.
    ///
    /// # Errors
    ///
    /// Returns a `Decode` transport error if the body is not a JSON object,
    /// `data` is not an array of objects, or `links.next` is neither a
    /// string nor null.
    pub fn from_json(body: &[u8]) -> SyncResult<Self> {
        let value: Value = mapsync_codec::from_json(body)
            .map_err(|e| SyncError::decode(format!("response is not JSON: {e}")))?;
        if value.as_map().is_none() {
            return Err(SyncError::decode(format!(
                "response must be an object, found {}",
                value.type_name()
            )));
        }

        let records = match value.get("data") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    Record::try_from(item.clone()).map_err(|other| {
                        SyncError::decode(format!(
                            "data[{i}] must be an object, found {}",
                            other.type_name()
                        ))
                    })
                })
                .collect::<SyncResult<Vec<_>>>()?,
            Some(other) => {
                return Err(SyncError::decode(format!(
                    "data must be an array, found {}",
                    other.type_name()
                )))
            }
        };

        let sort = serde_json::from_slice::<RawEnvelope<'_>>(body)
            .ok()
            .and_then(|envelope| envelope.meta)
            .and_then(|meta| meta.sort)
            .map(SortToken::from_raw)
            .filter(|sort| !sort.is_null());

        let next = match value.get("links").and_then(|links| links.get("next")) {
            None | Some(Value::Null) => None,
            Some(Value::Text(url)) if url.is_empty() => None,
            Some(Value::Text(url)) => Some(url.clone()),
            Some(other) => {
                return Err(SyncError::decode(format!(
                    "links.next must be a string or null, found {}",
                    other.type_name()
                )))
            }
        };

        let errors = value.get("errors").filter(|e| !e.is_null()).cloned();

        Ok(Self {
            records,
            sort,
            next,
            errors,
        })
    }
}

/// Just enough of a response to lift `meta.sort` out verbatim.
#[derive(Deserialize)]
struct RawEnvelope<'a> {
    #[serde(default, borrow)]
    meta: Option<RawMeta<'a>>,
}

#[derive(Deserialize)]
struct RawMeta<'a> {
    #[serde(default, borrow)]
    sort: Option<&'a RawValue>,
}

/// Performs one upstream round-trip.
pub trait PageFetcher: Send + Sync {
    /// Fetches the page after `cursor`, or the page at `continuation` if given.
    fn fetch(&self, cursor: &CursorValue, continuation: Option<&str>) -> SyncResult<Page>;
}

/// One recorded call to a [`ScriptedFetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    /// Cursor passed in.
    pub cursor: CursorValue,
    /// Continuation passed in.
    pub continuation: Option<String>,
}

/// A fetcher replaying queued responses, for testing.
///
/// Once the queue is exhausted it answers with an empty page.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<SyncResult<Page>>>,
    calls: Mutex<Vec<FetchCall>>,
}

impl ScriptedFetcher {
    /// Creates a fetcher with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher that returns `pages` in order.
    pub fn with_pages(pages: impl IntoIterator<Item = Page>) -> Self {
        let fetcher = Self::new();
        for page in pages {
            fetcher.push_page(page);
        }
        fetcher
    }

    /// Queues a page.
    pub fn push_page(&self, page: Page) {
        self.script.lock().push_back(Ok(page));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: SyncError) {
        self.script.lock().push_back(Err(error));
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of queued responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl PageFetcher for ScriptedFetcher {
    fn fetch(&self, cursor: &CursorValue, continuation: Option<&str>) -> SyncResult<Page> {
        self.calls.lock().push(FetchCall {
            cursor: cursor.clone(),
            continuation: continuation.map(str::to_string),
        });
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::default()))
    }
}
