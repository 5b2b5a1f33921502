mod mcp_error;
mod service_error;

pub use mcp_error::{ErrorCode, McpError};
pub use service_error::{ServiceError, ServiceErrorKind};
