//! Serve command implementation.

use super::build_driver;
use crate::env::EnvConfig;
use mapsync_trigger::{BearerAuth, TriggerConfig, TriggerHandler, TriggerServer};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the trigger configuration from `config`.
pub fn trigger_config(config: &EnvConfig) -> TriggerConfig {
    let trigger = TriggerConfig::new(config.trigger_addr)
        .with_method(config.trigger_method.as_str())
        .with_path(config.trigger_path.as_str());
    match &config.api_secret_key {
        Some(secret) => trigger.with_secret(secret.as_str()),
        None => trigger,
    }
}

/// Serves the trigger endpoint until interrupted.
pub fn run(config: &EnvConfig) -> Result<(), Box<dyn std::error::Error>> {
    // The driver owns a blocking HTTP client; build and drop it outside the runtime.
    let driver = build_driver(config)?;
    let trigger = trigger_config(config);
    let auth = BearerAuth::from_secret(trigger.secret.as_deref());
    if !auth.is_enabled() {
        warn!("API_SECRET_KEY is not set; the trigger accepts any request");
    }
    let handler = Arc::new(TriggerHandler::new(auth, driver));
    let server = TriggerServer::new(trigger, Arc::clone(&handler));
    server.router()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(server.serve(shutdown_signal()));
    drop(runtime);

    let stats = handler.runner().stats();
    info!(
        runs_completed = stats.runs_completed,
        runs_failed = stats.runs_failed,
        "trigger shut down"
    );
    drop(handler);
    Ok(result?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
