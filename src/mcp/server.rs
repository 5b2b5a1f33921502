use crate::app::App;
use crate::errors::{ErrorCode, McpError, ServiceError};
use crate::mcp::catalog::{tool_catalog, validate_tool_args};
use crate::mcp::protocol::{Inbound, JsonRpcResponse};
use crate::models::{
    DeviceInput, DeviceOs, ExecutionRequestInput, ExecutionResponse, OutputMode, PipeOperator,
    ShowCommandInput,
};
use crate::services::logger::Logger;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "netshow";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Deserialize)]
struct ExecuteShowArgs {
    hostname: String,
    username: String,
    password: String,
    os: String,
    commands: Vec<String>,
    #[serde(default)]
    port: Option<i64>,
    #[serde(default)]
    enable_password: Option<String>,
    #[serde(default)]
    timeout: Option<i64>,
    #[serde(default)]
    output_mode: Option<String>,
    #[serde(default)]
    use_jumphost: bool,
}

impl ExecuteShowArgs {
    fn into_request(self) -> ExecutionRequestInput {
        ExecutionRequestInput {
            devices: vec![DeviceInput {
                hostname: self.hostname,
                port: self.port,
                username: self.username,
                password: self.password,
                os_family: self.os,
                enable_password: self.enable_password,
                jumphost: None,
            }],
            commands: self
                .commands
                .into_iter()
                .map(|command| ShowCommandInput {
                    command,
                    ..ShowCommandInput::default()
                })
                .collect(),
            timeout_seconds: self.timeout,
            output_mode: self.output_mode,
            use_jumphost: self.use_jumphost,
        }
    }
}

fn text_content(text: String) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

fn supported_os_text() -> String {
    let mut lines = vec![
        "Supported Cisco Network Device Operating Systems:".to_string(),
        String::new(),
    ];
    for os in DeviceOs::ALL {
        lines.push(format!("- {:<9} : {}", os.as_str(), os.display_name()));
    }
    lines.push(String::new());
    lines.push("Note: JunOS is not supported due to incompatible command syntax.".to_string());
    lines.join("\n")
}

fn pipe_options_text() -> String {
    let mut lines = vec!["Available Pipe Filter Options:".to_string(), String::new()];
    for op in PipeOperator::ALL {
        lines.push(format!("- {:<8} : {}", op.as_str(), op.description()));
    }
    lines.extend(
        [
            "",
            "Example usage:",
            "  Command: show running-config",
            "  Pipe: include",
            "  Value: interface",
            "  Result: show running-config | include interface",
        ]
        .into_iter()
        .map(str::to_string),
    );
    lines.join("\n")
}

/// Renders a single-device response as readable text, one block per command.
fn render_execution(
    hostname: &str,
    os: &str,
    mode: OutputMode,
    response: &ExecutionResponse,
) -> String {
    let Some(device) = response.device_results.first() else {
        return format!("Device: {} ({})\nNo result returned\n", hostname, os);
    };
    let mut out = format!("Device: {} ({})\n", device.hostname, os);
    if let Some(err) = &device.device_error {
        out.push_str(&format!("ERROR [{}]: {}\n", err.kind.as_str(), err.message));
        return out;
    }
    out.push_str(&format!(
        "Commands executed: {}\n\n",
        device.command_results.len()
    ));
    for (idx, result) in device.command_results.iter().enumerate() {
        out.push_str(&format!(
            "--- Command {}: {} ---\n",
            idx + 1,
            result.full_command
        ));
        if let Some(err) = &result.execution_error {
            out.push_str(&format!("ERROR [{}]: {}\n\n", err.kind.as_str(), err.message));
            continue;
        }
        if let Some(raw) = &result.raw_output {
            out.push_str(raw);
            out.push('\n');
        }
        if mode.wants_parsed() {
            match (&result.parsed_output, &result.parse_error) {
                (Some(parsed), _) => {
                    let pretty = serde_json::to_string_pretty(parsed).unwrap_or_default();
                    out.push_str(&format!("Parsed:\n{}\n", pretty));
                }
                (None, Some(reason)) => out.push_str(&format!("Parse error: {}\n", reason)),
                (None, None) => {}
            }
        }
        out.push('\n');
    }
    out
}

pub struct McpServer {
    app: App,
    logger: Logger,
}

impl McpServer {
    pub fn new(app: App) -> Self {
        let logger = app.logger.child("mcp");
        Self { app, logger }
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"list": true, "call": true}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
        })
    }

    fn handle_tools_list(&self) -> Value {
        json!({ "tools": tool_catalog() })
    }

    pub async fn handle_tools_call(&self, name: &str, args: Value) -> Result<Value, McpError> {
        validate_tool_args(name, &args)?;
        match name {
            "execute_show_commands" => self.execute_show_commands(args).await,
            "list_supported_os" => Ok(text_content(supported_os_text())),
            "list_pipe_options" => Ok(text_content(pipe_options_text())),
            _ => Err(McpError::new(
                ErrorCode::MethodNotFound,
                format!("Unknown tool: {}", name),
            )),
        }
    }

    async fn execute_show_commands(&self, args: Value) -> Result<Value, McpError> {
        let args: ExecuteShowArgs = serde_json::from_value(args).map_err(|err| {
            McpError::from(ServiceError::invalid_params(format!(
                "Invalid arguments for execute_show_commands: {}",
                err
            )))
        })?;
        let hostname = args.hostname.clone();
        let os = args.os.clone();
        let mode = args
            .output_mode
            .as_deref()
            .and_then(OutputMode::from_name)
            .unwrap_or_default();
        let request = args.into_request();
        match self.app.execution_manager.execute(&request).await {
            Ok(response) => Ok(text_content(render_execution(
                &hostname, &os, mode, &response,
            ))),
            Err(err) => {
                self.logger.warn(
                    "Tool call rejected",
                    Some(&json!({
                        "tool": "execute_show_commands",
                        "kind": err.kind.as_str(),
                        "error": err.message,
                    })),
                );
                Err(err.into())
            }
        }
    }

    /// Handles one framed message. Notifications produce no response.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let (id, method, params) = match Inbound::decode(line) {
            Ok(Inbound::Request { id, method, params }) => (id, method, params),
            Ok(Inbound::Notification { method }) => {
                self.logger
                    .debug("Notification received", Some(&json!({"method": method})));
                return None;
            }
            Err(response) => return Some(response),
        };

        let response = match method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.handle_initialize()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.handle_tools_list()),
            "tools/call" => {
                let params = params.as_object().cloned().unwrap_or_default();
                let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
                if name.is_empty() {
                    JsonRpcResponse::failure(id, ErrorCode::InvalidParams, "Missing tool name")
                } else {
                    let args = params.get("arguments").cloned().unwrap_or(Value::Null);
                    match self.handle_tools_call(name, args).await {
                        Ok(result) => JsonRpcResponse::success(id, result),
                        Err(err) => JsonRpcResponse::failure(id, err.code, err.message),
                    }
                }
            }
            _ => JsonRpcResponse::failure(id, ErrorCode::MethodNotFound, "Method not found"),
        };
        Some(response)
    }

    /// Line-delimited JSON-RPC until the reader is exhausted.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<(), ServiceError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut writer = BufWriter::new(writer);
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(trimmed).await {
                writer.write_all(response.to_line().as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }

    pub async fn run_stdio(&self) -> Result<(), ServiceError> {
        self.logger.info("MCP server listening on stdio", None);
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }
}

pub async fn run_stdio(app: App) -> Result<(), ServiceError> {
    McpServer::new(app).run_stdio().await
}
