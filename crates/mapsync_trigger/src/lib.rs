//! # mapsync Trigger
//!
//! HTTP endpoint that starts a sync run on request.
//!
//! A request is accepted only with `Authorization: Bearer <secret>` when a
//! secret is configured. Accepted requests run the sync driver on tokio's
//! blocking pool and answer:
//!
//! - `401` when authorization fails, without starting a run
//! - `200` with a short summary when the run completes
//! - `500` when the run fails; details go to the log only
//!
//! ## Example
//!
//! ```rust,ignore
//! use mapsync_trigger::{BearerAuth, TriggerConfig, TriggerHandler, TriggerServer};
//! use std::sync::Arc;
//!
//! let config = TriggerConfig::default().with_secret("s3cret");
//! let handler = Arc::new(TriggerHandler::new(BearerAuth::new("s3cret"), driver));
//! TriggerServer::new(config, handler).serve(shutdown).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod config;
mod error;
mod handler;
mod server;

pub use auth::BearerAuth;
pub use config::TriggerConfig;
pub use error::{TriggerError, TriggerResult};
pub use handler::{SyncRunner, TriggerHandler, TriggerResponse};
pub use server::TriggerServer;
