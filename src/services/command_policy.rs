//! Read-only command policy.
//!
//! Every command sent to a device passes through [`validate_command`] and every
//! output filter through [`validate_pipe`]. The checks run in a fixed order
//! (emptiness, length, verb, denylist, allow-list) so the first failure names
//! the most specific reason.

use crate::constants::commands::READ_ONLY_VERB;
use crate::constants::limits::{MAX_COMMAND_LENGTH, MAX_PIPE_VALUE_LENGTH};
use crate::errors::ServiceError;
use crate::models::{PipeFilter, PipeOperator};
use once_cell::sync::Lazy;
use regex::Regex;

/// Shell metacharacters rejected anywhere in a command or filter value.
/// `&&` and `||` are covered by their single-character classes.
pub const DENYLIST: &[(char, &str)] = &[
    (';', "semicolon"),
    ('\n', "newline"),
    ('\r', "carriage return"),
    ('`', "backtick"),
    ('$', "dollar sign"),
    ('|', "pipe"),
    ('&', "ampersand"),
    ('>', "output redirect"),
    ('<', "input redirect"),
    ('!', "exclamation mark"),
];

static COMMAND_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:show) +[A-Za-z0-9 ._-]+$").expect("command grammar"));

static PIPE_VALUE_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9 ._,()-]+$").expect("pipe value grammar"));

fn printable(ch: char) -> String {
    match ch {
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        other => other.to_string(),
    }
}

fn check_denylist(text: &str, label: &str) -> Result<(), ServiceError> {
    for (ch, class) in DENYLIST {
        if text.contains(*ch) {
            return Err(ServiceError::invalid_params(format!(
                "{} contains disallowed character: {} ('{}')",
                label,
                class,
                printable(*ch)
            ))
            .with_details(serde_json::json!({"character_class": class})));
        }
    }
    Ok(())
}

fn starts_with_verb(text: &str) -> bool {
    text.get(..READ_ONLY_VERB.len())
        .map(|prefix| prefix.eq_ignore_ascii_case(READ_ONLY_VERB))
        .unwrap_or(false)
}

/// Validates and normalizes a single command. Returns the trimmed text.
pub fn validate_command(raw: &str) -> Result<String, ServiceError> {
    let command = raw.trim();
    if command.is_empty() {
        return Err(ServiceError::invalid_params("Command cannot be empty"));
    }
    if command.chars().count() > MAX_COMMAND_LENGTH {
        return Err(ServiceError::invalid_params(format!(
            "Command exceeds maximum length of {} characters",
            MAX_COMMAND_LENGTH
        )));
    }
    if !starts_with_verb(command) {
        return Err(ServiceError::invalid_params(
            "Only 'show' commands are allowed: this service is read-only (show-only restriction)",
        )
        .with_hint("Prefix the command with 'show', e.g. 'show version'."));
    }
    check_denylist(command, "Command")?;
    if !COMMAND_GRAMMAR.is_match(command) {
        return Err(ServiceError::invalid_params(
            "Command must be 'show' followed by letters, digits, spaces, '.', '-' or '_'",
        ));
    }
    Ok(command.to_string())
}

/// Validates an optional output filter. Operator and value must be given
/// together.
pub fn validate_pipe(
    operator: Option<PipeOperator>,
    value: Option<&str>,
) -> Result<Option<PipeFilter>, ServiceError> {
    let value = value.map(str::trim);
    match (operator, value) {
        (None, None) => Ok(None),
        (None, Some(_)) => Err(ServiceError::invalid_params(
            "Pipe value requires a pipe operator (include, exclude, begin, section)",
        )),
        (Some(op), None) | (Some(op), Some("")) => Err(ServiceError::invalid_params(format!(
            "Pipe operator '{}' requires a non-empty pipe value",
            op
        ))),
        (Some(op), Some(text)) => {
            if text.chars().count() > MAX_PIPE_VALUE_LENGTH {
                return Err(ServiceError::invalid_params(format!(
                    "Pipe value exceeds maximum length of {} characters",
                    MAX_PIPE_VALUE_LENGTH
                )));
            }
            check_denylist(text, "Pipe value")?;
            if !PIPE_VALUE_GRAMMAR.is_match(text) {
                return Err(ServiceError::invalid_params(
                    "Pipe value may only contain letters, digits, spaces and . - _ , ( )",
                ));
            }
            Ok(Some(PipeFilter {
                operator: op,
                value: text.to_string(),
            }))
        }
    }
}

/// Parses a pipe operator name as supplied by a client.
pub fn parse_pipe_operator(raw: Option<&str>) -> Result<Option<PipeOperator>, ServiceError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    PipeOperator::from_name(raw).map(Some).ok_or_else(|| {
        ServiceError::invalid_params(format!(
            "Unsupported pipe operator '{}'; expected one of include, exclude, begin, section",
            raw
        ))
    })
}
