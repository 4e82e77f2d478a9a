//! Sync driver state machine.

use crate::config::SyncConfig;
use crate::connector::{StoreConnector, SyncStore};
use crate::cursor::{CursorMode, CursorStore, CursorValue};
use crate::error::{SyncError, SyncResult};
use crate::fetcher::{Page, PageFetcher};
use crate::upsert::{RecordUpserter, UpsertOutcome, UpsertPolicy};
use mapsync_codec::Value;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// The state of a sync driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No run has started yet.
    Idle,
    /// Opening the store.
    Connecting,
    /// Reading the persisted cursor.
    ReadingCursor,
    /// Fetching pages and upserting records.
    Draining,
    /// Persisting the new cursor.
    AdvancingCursor,
    /// Closing the store.
    Disconnecting,
    /// The last run completed.
    Done,
    /// The last run failed.
    Failed,
}

impl SyncState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        !self.can_start_sync()
    }

    /// Returns true if a new run may start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Done | SyncState::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Source of the current Unix time.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now_unix(&self) -> i64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to, for testing.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    /// Creates a clock reading `now`.
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    /// Sets the time.
    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    /// Moves the time forward.
    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Statistics across all runs of a driver.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Runs that reached `Done`.
    pub runs_completed: u64,
    /// Runs that reached `Failed`.
    pub runs_failed: u64,
    /// Records inserted.
    pub records_inserted: u64,
    /// Records overwritten.
    pub records_updated: u64,
    /// Records skipped as duplicates.
    pub records_skipped: u64,
    /// Non-empty pages processed.
    pub pages: u64,
    /// When the last run completed.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Cursor mode used.
    pub mode: CursorMode,
    /// Fetch calls issued, including the final empty one.
    pub fetches: u64,
    /// Pages that carried records.
    pub pages: u64,
    /// Records inserted.
    pub inserted: u64,
    /// Records overwritten.
    pub updated: u64,
    /// Records skipped as duplicates.
    pub skipped: u64,
    /// Cursor before the run, `None` if none was stored.
    pub previous_cursor: Option<CursorValue>,
    /// Cursor persisted by the run.
    pub cursor: CursorValue,
    /// Wall time of the run.
    pub duration: Duration,
}

impl SyncReport {
    fn new(mode: CursorMode) -> Self {
        Self {
            mode,
            fetches: 0,
            pages: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            previous_cursor: None,
            cursor: CursorValue::zero(mode),
            duration: Duration::ZERO,
        }
    }

    /// Total records handed to the upserter.
    pub fn records(&self) -> u64 {
        self.inserted + self.updated + self.skipped
    }

    fn count(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::SkippedDuplicate => self.skipped += 1,
        }
    }
}

/// Drives one sync run at a time:
/// connect, read cursor, drain pages, advance cursor, disconnect.
///
/// The cursor is written only after every page has been upserted, so a
/// failed run leaves it untouched and the next run redoes the work.
pub struct SyncDriver<F: PageFetcher, C: StoreConnector> {
    config: SyncConfig,
    fetcher: F,
    connector: C,
    clock: Arc<dyn Clock>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<F: PageFetcher, C: StoreConnector> SyncDriver<F, C> {
    /// Creates a driver using the system clock.
    pub fn new(config: SyncConfig, fetcher: F, connector: C) -> Self {
        Self {
            config,
            fetcher,
            connector,
            clock: Arc::new(SystemClock),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the accumulated stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Gets the connector.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    fn set_state(&self, state: SyncState) {
        debug!(%state, "sync state");
        *self.state.write() = state;
    }

    /// Performs one full run.
    ///
    /// # Errors
    ///
    /// - `InvalidStateTransition` if a run is already active on this driver
    /// - any connect, fetch, upsert or cursor write failure; the cursor is
    ///   not advanced in that case
    pub fn run(&self) -> SyncResult<SyncReport> {
        let start = Instant::now();

        {
            let mut state = self.state.write();
            if !state.can_start_sync() {
                return Err(SyncError::InvalidStateTransition {
                    from: state.to_string(),
                    to: SyncState::Connecting.to_string(),
                });
            }
            *state = SyncState::Connecting;
        }
        info!(mode = %self.config.mode, cursor = %self.config.cursor_name, "sync run started");

        let store = match self.connector.connect() {
            Ok(store) => store,
            Err(e) => return Err(self.fail(e)),
        };

        let mut report = SyncReport::new(self.config.mode);
        if let Err(e) = self.drive(&store, &mut report) {
            if let Err(close_err) = store.close() {
                warn!(error = %close_err, "failed to close store after failed run");
            }
            return Err(self.fail(e));
        }

        self.set_state(SyncState::Disconnecting);
        if let Err(e) = store.close() {
            warn!(error = %e, "failed to close store; cursor already persisted");
        }

        report.duration = start.elapsed();
        self.set_state(SyncState::Done);
        {
            let mut stats = self.stats.write();
            stats.runs_completed += 1;
            stats.records_inserted += report.inserted;
            stats.records_updated += report.updated;
            stats.records_skipped += report.skipped;
            stats.pages += report.pages;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }
        info!(
            fetches = report.fetches,
            pages = report.pages,
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            cursor = %report.cursor,
            elapsed_ms = report.duration.as_millis() as u64,
            "sync run completed"
        );

        Ok(report)
    }

    fn drive(&self, store: &C::Store, report: &mut SyncReport) -> SyncResult<()> {
        let mode = self.config.mode;
        let name = &self.config.cursor_name;

        self.set_state(SyncState::ReadingCursor);
        let previous = match store.read_cursor(name, mode) {
            Ok(cursor) => Some(cursor),
            Err(e) if e.is_cursor_not_found() => {
                info!(cursor = %name, "no stored cursor, syncing from the beginning");
                None
            }
            Err(e) => return Err(e),
        };
        report.previous_cursor = previous.clone();
        let cursor = previous.unwrap_or_else(|| CursorValue::zero(mode));

        self.set_state(SyncState::Draining);
        let started_at = self.clock.now_unix();
        let policy = self.config.effective_policy();

        let next_cursor = match cursor {
            CursorValue::SortToken(token) => {
                let mut token = token;
                loop {
                    let page = self.fetch(&CursorValue::SortToken(token.clone()), None, report)?;
                    if page.is_empty() {
                        check_upstream_errors(page.errors.as_ref())?;
                        break;
                    }
                    let Some(sort) = page.sort.clone() else {
                        // Surface upstream errors ahead of the missing token.
                        if page.has_errors() {
                            self.apply(store, page, policy, report)?;
                        }
                        return Err(SyncError::decode("page has records but no meta.sort token"));
                    };
                    self.apply(store, page, policy, report)?;
                    token = sort;
                }
                CursorValue::SortToken(token)
            }
            CursorValue::Timestamp(since) => {
                let filter = CursorValue::Timestamp(since);
                let mut continuation: Option<String> = None;
                loop {
                    let page = self.fetch(&filter, continuation.as_deref(), report)?;
                    continuation = page.next.clone();
                    self.apply(store, page, policy, report)?;
                    if continuation.is_none() {
                        break;
                    }
                }
                CursorValue::Timestamp(started_at.max(since))
            }
        };

        self.set_state(SyncState::AdvancingCursor);
        store.write_cursor(name, &next_cursor)?;
        report.cursor = next_cursor;
        Ok(())
    }

    fn fetch(
        &self,
        cursor: &CursorValue,
        continuation: Option<&str>,
        report: &mut SyncReport,
    ) -> SyncResult<Page> {
        report.fetches += 1;
        let page = self.fetcher.fetch(cursor, continuation)?;
        debug!(
            fetch = report.fetches,
            records = page.records.len(),
            "fetched page"
        );
        Ok(page)
    }

    fn apply(
        &self,
        store: &C::Store,
        page: Page,
        policy: UpsertPolicy,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        if !page.is_empty() {
            report.pages += 1;
        }
        for record in page.records {
            let outcome = store.upsert(record, policy)?;
            report.count(outcome);
        }
        check_upstream_errors(page.errors.as_ref())
    }

    fn fail(&self, error: SyncError) -> SyncError {
        error!(error = %error, state = %self.state(), "sync run failed");
        self.set_state(SyncState::Failed);
        let mut stats = self.stats.write();
        stats.runs_failed += 1;
        stats.last_error = Some(error.to_string());
        error
    }
}

fn check_upstream_errors(errors: Option<&Value>) -> SyncResult<()> {
    match errors {
        Some(errors) if !errors.is_empty() => Err(SyncError::Upstream {
            errors: errors.to_string(),
        }),
        _ => Ok(()),
    }
}
