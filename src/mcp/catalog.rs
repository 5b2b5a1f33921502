use crate::errors::{ErrorCode, McpError};
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

static TOOL_CATALOG: Lazy<Vec<ToolDef>> = Lazy::new(|| {
    let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tool_catalog.json"));
    serde_json::from_str(raw).expect("tool_catalog.json must be valid JSON")
});

static TOOL_MAP: Lazy<HashMap<String, ToolDef>> = Lazy::new(|| {
    TOOL_CATALOG
        .iter()
        .cloned()
        .map(|tool| (tool.name.clone(), tool))
        .collect()
});

static TOOL_VALIDATORS: Lazy<HashMap<String, JSONSchema>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for tool in TOOL_CATALOG.iter() {
        if let Ok(schema) = JSONSchema::compile(&tool.input_schema) {
            map.insert(tool.name.clone(), schema);
        }
    }
    map
});

pub fn tool_catalog() -> &'static Vec<ToolDef> {
    &TOOL_CATALOG
}

pub fn tool_by_name(name: &str) -> Option<&'static ToolDef> {
    TOOL_MAP.get(name)
}

/// Checks `args` against the tool's input schema. A missing argument object
/// is treated as `{}`.
pub fn validate_tool_args(tool_name: &str, args: &Value) -> Result<(), McpError> {
    if tool_by_name(tool_name).is_none() {
        return Err(McpError::new(
            ErrorCode::MethodNotFound,
            format!("Unknown tool: {}", tool_name),
        ));
    }
    let Some(schema) = TOOL_VALIDATORS.get(tool_name) else {
        return Ok(());
    };
    let empty = Value::Object(Default::default());
    let args = if args.is_null() { &empty } else { args };
    if let Err(errors) = schema.validate(args) {
        let message = format_schema_errors(tool_name, errors);
        return Err(McpError::new(ErrorCode::InvalidParams, message));
    }
    Ok(())
}

fn format_schema_errors(tool_name: &str, errors: jsonschema::ErrorIterator) -> String {
    let mut lines = vec![format!("Invalid arguments for {}", tool_name)];
    for err in errors.take(10) {
        let path = err.instance_path.to_string();
        let path = if path.is_empty() {
            "(root)".to_string()
        } else {
            path
        };
        let detail = match &err.kind {
            jsonschema::error::ValidationErrorKind::Required { property } => format!(
                "missing required field '{}'",
                property.as_str().map(str::to_string).unwrap_or_else(|| property.to_string())
            ),
            jsonschema::error::ValidationErrorKind::AdditionalProperties { unexpected } => {
                format!("unknown field(s) {}", unexpected.join(", "))
            }
            jsonschema::error::ValidationErrorKind::Type { kind } => {
                format!("expected {}", format_type_kind(kind))
            }
            _ => err.to_string(),
        };
        lines.push(format!("- {}: {}", path, detail));
    }
    lines.join("\n")
}

fn format_type_kind(kind: &jsonschema::error::TypeKind) -> String {
    match kind {
        jsonschema::error::TypeKind::Single(primitive) => primitive.to_string(),
        jsonschema::error::TypeKind::Multiple(types) => {
            let list: Vec<String> = (*types).into_iter().map(|t| t.to_string()).collect();
            if list.is_empty() {
                "unknown".to_string()
            } else {
                list.join(" | ")
            }
        }
    }
}
