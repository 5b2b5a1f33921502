use super::{ServiceError, ServiceErrorKind};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(i32)]
pub enum ErrorCode {
    RequestTimeout = -32001,
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct McpError {
    pub code: ErrorCode,
    pub message: String,
}

impl McpError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for McpError {
    fn from(err: ServiceError) -> Self {
        let code = match err.kind {
            ServiceErrorKind::InvalidParams | ServiceErrorKind::Configuration => {
                ErrorCode::InvalidParams
            }
            ServiceErrorKind::Timeout => ErrorCode::RequestTimeout,
            _ => ErrorCode::InternalError,
        };
        let mut message = format!("{}: {}", err.kind.as_str(), err.message);
        if let Some(hint) = &err.hint {
            message.push_str(&format!(" (hint: {})", hint));
        }
        McpError::new(code, message)
    }
}

impl fmt::Display for McpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for McpError {}
