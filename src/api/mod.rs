//! HTTP API.

pub mod error;
pub mod execute;
pub mod health;
pub mod jumphost;

use crate::app::App;
use crate::errors::ServiceError;
use axum::Router;
use tokio::net::TcpListener;

pub use error::ApiError;

/// Every route the service exposes.
pub fn router(app: App) -> Router {
    Router::new()
        .merge(health::router())
        .merge(execute::router(app.clone()))
        .merge(jumphost::router(app))
}

pub struct ApiServer {
    app: App,
    host: String,
    port: u16,
}

impl ApiServer {
    pub fn new(app: App, host: impl Into<String>, port: u16) -> Self {
        Self {
            app,
            host: host.into(),
            port,
        }
    }

    /// Binds and serves until the process is stopped.
    pub async fn run(self) -> Result<(), ServiceError> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr).await.map_err(|err| {
            ServiceError::configuration(format!("Failed to bind API server on {}: {}", addr, err))
        })?;
        let logger = self.app.logger.child("api");
        logger.info("API server listening", Some(&serde_json::json!({"addr": addr})));
        axum::serve(listener, router(self.app))
            .await
            .map_err(|err| ServiceError::internal(format!("API server error: {}", err)))?;
        logger.info("API server stopped", None);
        Ok(())
    }
}
