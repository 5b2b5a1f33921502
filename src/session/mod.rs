//! Transport seams for device sessions and bastion tunnels.
//!
//! The orchestrator only talks to these traits; `ssh` provides the ssh2
//! implementation used by the binary and tests substitute in-memory fakes.

pub mod ssh;

use crate::errors::ServiceError;
use crate::models::{DeviceCredential, JumphostConfig, JumphostKey};
use async_trait::async_trait;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

pub use ssh::{SshDeviceConnector, SshProxyConnector};

/// An authenticated bastion connection able to open forwarded channels.
pub trait ProxyConnection: Send + Sync {
    fn key(&self) -> &JumphostKey;

    /// Opens a tunnel to `host:port` through the bastion and returns a local
    /// stream bridged to it.
    fn open_channel(&self, host: &str, port: u16, timeout: Duration)
        -> Result<TcpStream, ServiceError>;

    /// Tears the connection down. Calling it more than once is a no-op.
    fn close(&self);
}

#[async_trait]
pub trait ProxyConnector: Send + Sync {
    async fn connect(
        &self,
        config: &JumphostConfig,
        timeout: Duration,
    ) -> Result<Arc<dyn ProxyConnection>, ServiceError>;
}

/// A live session on one device. Commands run strictly in call order.
#[async_trait]
pub trait DeviceSession: Send {
    async fn execute(&mut self, command: &str, timeout: Duration) -> Result<String, ServiceError>;

    async fn close(&mut self);
}

#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn open(
        &self,
        device: &DeviceCredential,
        proxy: Option<Arc<dyn ProxyConnection>>,
        timeout: Duration,
    ) -> Result<Box<dyn DeviceSession>, ServiceError>;
}
