//! Process settings read once at startup from the environment.

use crate::constants::execution::{DEFAULT_MAX_PARALLEL_DEVICES, MAX_PARALLEL_DEVICES};
use crate::constants::network::{
    DEFAULT_API_HOST, DEFAULT_API_PORT, DEFAULT_MCP_HOST, DEFAULT_MCP_PORT,
    TIMEOUT_JUMPHOST_CONNECT_MS,
};
use crate::errors::ServiceError;
use crate::models::JumphostInput;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_host: String,
    pub api_port: u16,
    pub mcp_host: String,
    pub mcp_port: u16,
    pub max_parallel_devices: usize,
    pub jumphost_connect_timeout: Duration,
    /// Server-side bastion used when a request sets `use_jumphost`. Kept
    /// unvalidated so a partial setup is reported per request.
    pub default_jumphost: Option<JumphostInput>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_API_HOST.to_string(),
            api_port: DEFAULT_API_PORT,
            mcp_host: DEFAULT_MCP_HOST.to_string(),
            mcp_port: DEFAULT_MCP_PORT,
            max_parallel_devices: DEFAULT_MAX_PARALLEL_DEVICES,
            jumphost_connect_timeout: Duration::from_millis(TIMEOUT_JUMPHOST_CONNECT_MS),
            default_jumphost: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Settings::default();

        let api_port = match read("API_PORT") {
            Some(raw) => parse_listen_port("API_PORT", &raw)?,
            None => defaults.api_port,
        };
        let mcp_port = match read("MCP_PORT") {
            Some(raw) => parse_listen_port("MCP_PORT", &raw)?,
            None => defaults.mcp_port,
        };
        let max_parallel_devices = match read("NETSHOW_MAX_PARALLEL_DEVICES") {
            Some(raw) => parse_number::<usize>("NETSHOW_MAX_PARALLEL_DEVICES", &raw)?,
            None => defaults.max_parallel_devices,
        }
        .clamp(1, MAX_PARALLEL_DEVICES);
        let jumphost_connect_timeout = match read("NETSHOW_JUMPHOST_CONNECT_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(
                parse_number::<u64>("NETSHOW_JUMPHOST_CONNECT_TIMEOUT_MS", &raw)?.max(1),
            ),
            None => defaults.jumphost_connect_timeout,
        };

        let jumphost = JumphostInput {
            host: read("JUMPHOST_HOST"),
            port: match read("JUMPHOST_PORT") {
                Some(raw) => Some(parse_number::<i64>("JUMPHOST_PORT", &raw)?),
                None => None,
            },
            username: read("JUMPHOST_USERNAME"),
            key_path: read("JUMPHOST_KEY_PATH"),
        };
        let any_jumphost_field = jumphost.host.is_some()
            || jumphost.port.is_some()
            || jumphost.username.is_some()
            || jumphost.key_path.is_some();

        Ok(Self {
            api_host: read("API_HOST").unwrap_or(defaults.api_host),
            api_port,
            mcp_host: read("MCP_HOST").unwrap_or(defaults.mcp_host),
            mcp_port,
            max_parallel_devices,
            jumphost_connect_timeout,
            default_jumphost: any_jumphost_field.then_some(jumphost),
        })
    }
}

fn parse_listen_port(key: &str, raw: &str) -> Result<u16, ServiceError> {
    match parse_number::<u16>(key, raw)? {
        0 => Err(ServiceError::configuration(format!(
            "{} must be between 1 and 65535",
            key
        ))),
        port => Ok(port),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ServiceError> {
    raw.parse::<T>().map_err(|_| {
        ServiceError::configuration(format!("{} must be a number (got '{}')", key, raw))
    })
}
