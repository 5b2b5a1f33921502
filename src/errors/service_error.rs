use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    InvalidParams,
    Configuration,
    Connection,
    Timeout,
    Execution,
    Parse,
    Internal,
}

impl ServiceErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceErrorKind::InvalidParams => "invalid_params",
            ServiceErrorKind::Configuration => "configuration",
            ServiceErrorKind::Connection => "connection",
            ServiceErrorKind::Timeout => "timeout",
            ServiceErrorKind::Execution => "execution",
            ServiceErrorKind::Parse => "parse",
            ServiceErrorKind::Internal => "internal",
        }
    }

    /// Errors of these kinds mean the input was never safe to act on, so the
    /// whole request is rejected instead of producing partial results.
    pub fn aborts_request(self) -> bool {
        matches!(
            self,
            ServiceErrorKind::InvalidParams | ServiceErrorKind::Configuration
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ServiceError {
    pub fn new(
        kind: ServiceErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Configuration, "CONFIGURATION", message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Connection, "CONNECTION", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Timeout, "TIMEOUT", message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Execution, "EXECUTION", message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Parse, "PARSE", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Internal, "INTERNAL", message)
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ServiceError {}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                ServiceError::timeout(err.to_string())
            }
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::AddrNotAvailable => ServiceError::connection(err.to_string()),
            _ => ServiceError::internal(err.to_string()),
        }
    }
}
