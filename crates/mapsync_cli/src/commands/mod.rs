//! CLI command implementations.

pub mod hit;
pub mod inspect;
pub mod serve;
pub mod sync;

use crate::env::EnvConfig;
use mapsync_store::StoreConfig;
use mapsync_sync_engine::{
    DocumentStoreConnector, FetcherConfig, HttpPageFetcher, ReqwestClient, SyncConfig, SyncDriver,
};

/// The driver wired to the real upstream and the on-disk store.
pub type CliDriver = SyncDriver<HttpPageFetcher<ReqwestClient>, DocumentStoreConnector>;

/// Builds a driver from `config`.
///
/// The reqwest client is blocking, so this must not run inside an async context.
pub fn build_driver(config: &EnvConfig) -> Result<CliDriver, Box<dyn std::error::Error>> {
    let fetcher_config =
        FetcherConfig::new(config.require_node_url()?).with_timeout(config.fetch_timeout);
    let fetcher = HttpPageFetcher::with_reqwest(fetcher_config)?;
    let connector = DocumentStoreConnector::open_path(&config.store_path, StoreConfig::default());
    Ok(SyncDriver::new(
        SyncConfig::new(config.sync_mode),
        fetcher,
        connector,
    ))
}
