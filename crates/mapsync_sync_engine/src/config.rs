//! Configuration for the sync engine.

use crate::cursor::CursorMode;
use crate::upsert::UpsertPolicy;
use std::time::Duration;

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Cursor semantics.
    pub mode: CursorMode,
    /// Name of the persisted cursor.
    pub cursor_name: String,
    /// Upsert policy override. Defaults to the mode's policy.
    pub policy: Option<UpsertPolicy>,
}

impl SyncConfig {
    /// Creates a configuration for the given mode.
    pub fn new(mode: CursorMode) -> Self {
        Self {
            mode,
            cursor_name: "current".into(),
            policy: None,
        }
    }

    /// Sets the cursor name.
    pub fn with_cursor_name(mut self, name: impl Into<String>) -> Self {
        self.cursor_name = name.into();
        self
    }

    /// Overrides the upsert policy.
    pub fn with_policy(mut self, policy: UpsertPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// The policy used for every record in a run.
    ///
    /// Sort-token sync overwrites; timestamp sync skips duplicates.
    pub fn effective_policy(&self) -> UpsertPolicy {
        self.policy.unwrap_or(match self.mode {
            CursorMode::SortToken => UpsertPolicy::Overwrite,
            CursorMode::Timestamp => UpsertPolicy::Skip,
        })
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(CursorMode::SortToken)
    }
}

/// Where mirrored data lives in the local store.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    /// Collection holding mirrored profiles.
    pub profiles: String,
    /// Collection holding cursor documents.
    pub settings: String,
    /// Field used to deduplicate profiles.
    pub identity_field: String,
}

impl StoreLayout {
    /// Sets the profiles collection.
    pub fn with_profiles(mut self, name: impl Into<String>) -> Self {
        self.profiles = name.into();
        self
    }

    /// Sets the settings collection.
    pub fn with_settings(mut self, name: impl Into<String>) -> Self {
        self.settings = name.into();
        self
    }

    /// Sets the identity field.
    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            profiles: "profiles".into(),
            settings: "settings".into(),
            identity_field: "profile_url".into(),
        }
    }
}

/// Configuration for the upstream HTTP fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Upstream base URL, without trailing slash.
    pub base_url: String,
    /// Path POSTed to in sort-token mode.
    pub export_path: String,
    /// Path fetched in timestamp mode.
    pub nodes_path: String,
    /// Bound on a single round-trip.
    pub timeout: Duration,
}

impl FetcherConfig {
    /// Creates a configuration for the given upstream.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            export_path: "/export".into(),
            nodes_path: "/nodes".into(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Sets the export path.
    pub fn with_export_path(mut self, path: impl Into<String>) -> Self {
        self.export_path = path.into();
        self
    }

    /// Sets the nodes path.
    pub fn with_nodes_path(mut self, path: impl Into<String>) -> Self {
        self.nodes_path = path.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the export endpoint.
    pub fn export_url(&self) -> String {
        format!("{}{}", self.base_url, self.export_path)
    }

    /// Full URL of the nodes endpoint.
    pub fn nodes_url(&self) -> String {
        format!("{}{}", self.base_url, self.nodes_path)
    }
}
