//! Request handling, independent of the HTTP framework.

use crate::auth::BearerAuth;
use mapsync_sync_engine::{
    PageFetcher, StoreConnector, SyncDriver, SyncReport, SyncResult, SyncState,
};
use tracing::{error, info, warn};

/// Something that can perform one sync run.
pub trait SyncRunner: Send + Sync {
    /// Runs to completion.
    fn run_sync(&self) -> SyncResult<SyncReport>;

    /// Current state, for logging.
    fn sync_state(&self) -> SyncState;
}

impl<F: PageFetcher, C: StoreConnector> SyncRunner for SyncDriver<F, C> {
    fn run_sync(&self) -> SyncResult<SyncReport> {
        self.run()
    }

    fn sync_state(&self) -> SyncState {
        self.state()
    }
}

/// Status and body of a trigger response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerResponse {
    /// HTTP status code.
    pub status: u16,
    /// Plain-text body.
    pub body: String,
}

impl TriggerResponse {
    fn ok(report: &SyncReport) -> Self {
        Self {
            status: 200,
            body: format!(
                "synced {} records ({} inserted, {} updated, {} skipped)",
                report.records(),
                report.inserted,
                report.updated,
                report.skipped
            ),
        }
    }

    fn unauthorized() -> Self {
        Self {
            status: 401,
            body: "Unauthorized Operation!".into(),
        }
    }

    fn failed() -> Self {
        Self {
            status: 500,
            body: "sync failed".into(),
        }
    }

    /// Response for a run whose task did not complete.
    pub fn internal_error() -> Self {
        Self::failed()
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Authorizes a trigger request and runs the sync.
#[derive(Debug)]
pub struct TriggerHandler<R: SyncRunner> {
    auth: BearerAuth,
    runner: R,
}

impl<R: SyncRunner> TriggerHandler<R> {
    /// Creates a new handler.
    pub fn new(auth: BearerAuth, runner: R) -> Self {
        Self { auth, runner }
    }

    /// Returns the runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Handles one request carrying `authorization` (the raw header value).
    ///
    /// Run failures are logged; the response body never carries their details.
    pub fn handle(&self, authorization: Option<&str>) -> TriggerResponse {
        if let Err(e) = self.auth.validate(authorization) {
            warn!(error = %e, "rejected trigger request");
            return TriggerResponse::unauthorized();
        }

        info!("trigger accepted, starting sync run");
        match self.runner.run_sync() {
            Ok(report) => TriggerResponse::ok(&report),
            Err(e) => {
                error!(error = %e, state = %self.runner.sync_state(), "triggered sync failed");
                TriggerResponse::failed()
            }
        }
    }
}
