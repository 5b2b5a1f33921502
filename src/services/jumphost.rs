//! Per-request jumphost selection and connection reuse.
//!
//! A router lives for exactly one batch. Devices that share a bastion
//! identity `(host, port, username)` share one connection; the first caller
//! connects while concurrent callers wait on the same cell. A failed connect
//! is remembered too, so an unreachable bastion is tried once per batch.

use crate::errors::ServiceError;
use crate::models::{DeviceCredential, JumphostConfig, JumphostKey};
use crate::services::logger::Logger;
use crate::session::{ProxyConnection, ProxyConnector};
use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

type ConnectOutcome = Result<Arc<dyn ProxyConnection>, ServiceError>;

pub struct JumphostRouter {
    connector: Arc<dyn ProxyConnector>,
    default: Option<JumphostConfig>,
    connect_timeout: Duration,
    connections: DashMap<JumphostKey, Arc<OnceCell<ConnectOutcome>>>,
    closed: AtomicBool,
    logger: Logger,
}

impl JumphostRouter {
    pub fn new(
        connector: Arc<dyn ProxyConnector>,
        default: Option<JumphostConfig>,
        connect_timeout: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            connector,
            default,
            connect_timeout,
            connections: DashMap::new(),
            closed: AtomicBool::new(false),
            logger: logger.child("router"),
        }
    }

    /// Picks the bastion for a device: its own, then the request default.
    /// `None` means a direct connection.
    pub fn select<'a>(&'a self, device: &'a DeviceCredential) -> Option<&'a JumphostConfig> {
        device.jumphost().or(self.default.as_ref())
    }

    /// Returns the proxy for `device`, connecting on first use of its
    /// bastion identity.
    pub async fn resolve(
        &self,
        device: &DeviceCredential,
    ) -> Result<Option<Arc<dyn ProxyConnection>>, ServiceError> {
        let Some(config) = self.select(device) else {
            return Ok(None);
        };
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServiceError::connection("Jumphost router is shut down"));
        }
        let key = config.key();
        let cell = self
            .connections
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = cell
            .get_or_init(|| async {
                let started = std::time::Instant::now();
                let outcome = self.connector.connect(config, self.connect_timeout).await;
                match &outcome {
                    Ok(_) => self.logger.info(
                        "Jumphost ready",
                        Some(&json!({
                            "jumphost": key.to_string(),
                            "duration_ms": started.elapsed().as_millis() as u64,
                        })),
                    ),
                    Err(err) => self.logger.warn(
                        "Jumphost connection failed",
                        Some(&json!({
                            "jumphost": key.to_string(),
                            "kind": err.kind.as_str(),
                            "error": err.message,
                        })),
                    ),
                }
                outcome
            })
            .await;
        outcome.clone().map(Some)
    }

    /// Number of bastion connections currently open.
    pub fn open_connections(&self) -> usize {
        self.connections
            .iter()
            .filter(|entry| matches!(entry.value().get(), Some(Ok(_))))
            .count()
    }

    /// Closes every connection this router opened. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let cells: Vec<_> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.connections.clear();
        let mut closed = 0usize;
        for cell in cells {
            if let Some(Ok(connection)) = cell.get() {
                connection.close();
                closed += 1;
            }
        }
        if closed > 0 {
            self.logger
                .debug("Jumphost connections closed", Some(&json!({"count": closed})));
        }
    }
}

impl Drop for JumphostRouter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
