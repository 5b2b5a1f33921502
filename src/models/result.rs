use crate::errors::{ServiceError, ServiceErrorKind};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl From<&ServiceError> for ErrorEntry {
    fn from(err: &ServiceError) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResult {
    pub full_command: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<ErrorEntry>,
}

impl CommandResult {
    pub fn succeeded(full_command: String, raw_output: String) -> Self {
        Self {
            full_command,
            succeeded: true,
            raw_output: Some(raw_output),
            parsed_output: None,
            parse_error: None,
            execution_error: None,
        }
    }

    pub fn failed(full_command: String, err: &ServiceError) -> Self {
        Self {
            full_command,
            succeeded: false,
            raw_output: None,
            parsed_output: None,
            parse_error: None,
            execution_error: Some(err.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceResult {
    pub hostname: String,
    pub succeeded: bool,
    pub command_results: Vec<CommandResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_error: Option<ErrorEntry>,
}

impl DeviceResult {
    pub fn connected(hostname: impl Into<String>, command_results: Vec<CommandResult>) -> Self {
        Self {
            hostname: hostname.into(),
            succeeded: true,
            command_results,
            device_error: None,
        }
    }

    /// Connection-level failure: no command ran.
    pub fn unreachable(hostname: impl Into<String>, err: &ServiceError) -> Self {
        Self {
            hostname: hostname.into(),
            succeeded: false,
            command_results: Vec::new(),
            device_error: Some(err.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResponse {
    pub device_results: Vec<DeviceResult>,
    pub total_devices: usize,
    pub successful_devices: usize,
    pub failed_devices: usize,
}

/// Outcome of a bastion connectivity check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JumphostTestResult {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub succeeded: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEntry>,
}

/// Builds the response from per-device results. Counts are always derived
/// from the list, which keeps request order.
pub fn aggregate(device_results: Vec<DeviceResult>) -> ExecutionResponse {
    let total_devices = device_results.len();
    let successful_devices = device_results.iter().filter(|r| r.succeeded).count();
    ExecutionResponse {
        device_results,
        total_devices,
        successful_devices,
        failed_devices: total_devices - successful_devices,
    }
}
