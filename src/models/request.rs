use super::command::ShowCommand;
use super::device::DeviceCredential;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Raw,
    Parsed,
    Both,
}

impl OutputMode {
    pub fn from_name(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "raw" => Some(OutputMode::Raw),
            "parsed" => Some(OutputMode::Parsed),
            "both" => Some(OutputMode::Both),
            _ => None,
        }
    }

    pub fn wants_parsed(self) -> bool {
        matches!(self, OutputMode::Parsed | OutputMode::Both)
    }

    pub fn wants_raw(self) -> bool {
        matches!(self, OutputMode::Raw | OutputMode::Both)
    }
}

/// Jumphost fields as received. Every field is optional so that a partially
/// configured proxy is reported as a configuration problem naming what is
/// missing instead of a generic deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JumphostInput {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceInput {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "os")]
    pub os_family: String,
    #[serde(default)]
    pub enable_password: Option<String>,
    #[serde(default)]
    pub jumphost: Option<JumphostInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowCommandInput {
    #[serde(default)]
    pub command: String,
    #[serde(default, alias = "pipe_option")]
    pub pipe_operator: Option<String>,
    #[serde(default)]
    pub pipe_value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionRequestInput {
    #[serde(default)]
    pub devices: Vec<DeviceInput>,
    #[serde(default)]
    pub commands: Vec<ShowCommandInput>,
    #[serde(default, alias = "timeout")]
    pub timeout_seconds: Option<i64>,
    #[serde(default, alias = "output_format")]
    pub output_mode: Option<String>,
    #[serde(default)]
    pub use_jumphost: bool,
}

/// A fully validated batch. Built only by `Validation::validate_request`.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub devices: Vec<DeviceCredential>,
    pub commands: Vec<ShowCommand>,
    pub timeout_seconds: u64,
    pub output_mode: OutputMode,
    pub use_jumphost: bool,
}

impl ExecutionRequest {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
