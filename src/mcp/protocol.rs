//! JSON-RPC 2.0 framing shared by the stdio and SSE transports.

use crate::errors::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const JSONRPC_VERSION: &str = "2.0";
const NOTIFICATION_PREFIX: &str = "notifications/";

#[derive(Debug, Deserialize)]
struct Envelope {
    jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Value,
}

/// One decoded client message.
///
/// Notifications carry no reply slot at all: anything without an id, and
/// anything in the `notifications/` namespace, decodes to
/// [`Inbound::Notification`] and can never produce a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Request {
        id: Value,
        method: String,
        params: Value,
    },
    Notification {
        method: String,
    },
}

fn is_valid_id(id: &Value) -> bool {
    id.is_string() || id.is_number()
}

impl Inbound {
    /// Decodes one message. On failure the error is the response to send.
    pub fn decode(raw: &str) -> Result<Self, JsonRpcResponse> {
        let value: Value = serde_json::from_str(raw).map_err(|_| {
            JsonRpcResponse::failure(Value::Null, ErrorCode::ParseError, "Parse error")
        })?;
        let echo_id = value
            .get("id")
            .filter(|id| is_valid_id(id))
            .cloned()
            .unwrap_or(Value::Null);
        let invalid =
            |id: Value| JsonRpcResponse::failure(id, ErrorCode::InvalidRequest, "Invalid request");

        let envelope: Envelope =
            serde_json::from_value(value).map_err(|_| invalid(echo_id.clone()))?;
        if envelope.jsonrpc != JSONRPC_VERSION {
            return Err(invalid(echo_id));
        }
        if envelope.method.starts_with(NOTIFICATION_PREFIX) {
            return Ok(Inbound::Notification {
                method: envelope.method,
            });
        }
        match envelope.id {
            None => Ok(Inbound::Notification {
                method: envelope.method,
            }),
            Some(id) if is_valid_id(&id) => Ok(Inbound::Request {
                id,
                method: envelope.method,
                params: envelope.params,
            }),
            Some(_) => Err(invalid(Value::Null)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(JsonRpcError {
                code: code.as_i32(),
                message: message.into(),
            }),
        }
    }

    /// Single-line JSON, as written to a line-delimited stream or SSE event.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
