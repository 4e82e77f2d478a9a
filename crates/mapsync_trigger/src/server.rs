//! HTTP server exposing the trigger endpoint.

use crate::config::TriggerConfig;
use crate::error::{TriggerError, TriggerResult};
use crate::handler::{SyncRunner, TriggerHandler, TriggerResponse};
use axum::extract::State;
use axum::http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Serves the trigger endpoint.
///
/// Sync runs are synchronous and execute on tokio's blocking pool.
pub struct TriggerServer<R: SyncRunner + 'static> {
    config: TriggerConfig,
    handler: Arc<TriggerHandler<R>>,
}

impl<R: SyncRunner + 'static> TriggerServer<R> {
    /// Creates a server for `handler`.
    pub fn new(config: TriggerConfig, handler: Arc<TriggerHandler<R>>) -> Self {
        Self { config, handler }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Builds the router.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the method is not routable or the path
    /// does not start with `/`.
    pub fn router(&self) -> TriggerResult<Router> {
        let method = Method::from_bytes(self.config.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| invalid_method(&self.config.method))?;
        let filter =
            MethodFilter::try_from(method).map_err(|_| invalid_method(&self.config.method))?;
        if !self.config.path.starts_with('/') {
            return Err(TriggerError::InvalidConfig(format!(
                "path must start with '/': {}",
                self.config.path
            )));
        }

        Ok(Router::new()
            .route(&self.config.path, on(filter, trigger::<R>))
            .with_state(Arc::clone(&self.handler)))
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the router is invalid or the socket cannot be bound.
    pub async fn serve<S>(self, shutdown: S) -> TriggerResult<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_on(listener, shutdown).await
    }

    /// Serves on an already-bound listener until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if the router is invalid or serving fails.
    pub async fn serve_on<S>(self, listener: TcpListener, shutdown: S) -> TriggerResult<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let router = self.router()?;
        info!(
            addr = %listener.local_addr()?,
            method = %self.config.method,
            path = %self.config.path,
            "trigger listening"
        );
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("trigger stopped");
        Ok(())
    }
}

fn invalid_method(method: &str) -> TriggerError {
    TriggerError::InvalidConfig(format!("unsupported method: {method}"))
}

async fn trigger<R: SyncRunner + 'static>(
    State(handler): State<Arc<TriggerHandler<R>>>,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let response =
        tokio::task::spawn_blocking(move || handler.handle(authorization.as_deref())).await;
    let response = response.unwrap_or_else(|e| {
        error!(error = %TriggerError::Task(e.to_string()), "sync task did not complete");
        TriggerResponse::internal_error()
    });

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, response.body).into_response()
}
