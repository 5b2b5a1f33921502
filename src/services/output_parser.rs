//! Structured parsing of raw `show` output.
//!
//! Parsing is best effort. A parser failure never changes whether the
//! command succeeded; the caller records it as `parse_error` instead.

use crate::errors::ServiceError;
use crate::models::DeviceOs;
use crate::utils::text::normalize_command_key;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

pub trait OutputParser: Send + Sync {
    fn parse(&self, os: DeviceOs, base_command: &str, raw: &str) -> Result<Value, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Template {
    Version,
    IpInterfaceBrief,
    Clock,
    Inventory,
}

const TEMPLATES: &[(&str, Template)] = &[
    ("show version", Template::Version),
    ("show ip interface brief", Template::IpInterfaceBrief),
    ("show clock", Template::Clock),
    ("show inventory", Template::Inventory),
];

static VERSION_PATTERNS: Lazy<Vec<(DeviceOs, Regex)>> = Lazy::new(|| {
    vec![
        (
            DeviceOs::Iosxr,
            Regex::new(r"Cisco IOS XR Software, Version\s+([^\s\[,]+)").expect("xr version"),
        ),
        (
            DeviceOs::Nxos,
            Regex::new(r"(?m)^\s*(?:NXOS|system):\s+version\s+(\S+)").expect("nxos version"),
        ),
        (
            DeviceOs::Asa,
            Regex::new(r"Cisco Adaptive Security Appliance Software Version\s+(\S+)")
                .expect("asa version"),
        ),
        (
            DeviceOs::Ios,
            Regex::new(r"Cisco IOS(?: XE)? Software.*?Version\s+([^\s,]+)").expect("ios version"),
        ),
    ]
});

static UPTIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(\S+)\s+uptime is\s+(.+?)\s*$").expect("uptime"));
static IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s*(?:System image file is|NXOS image file is:)\s+"?([^"\s]+)"?"#)
        .expect("image")
});
static HARDWARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^cisco\s+(\S+).*?(?:processor|chassis)").expect("hardware"));
static SERIAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?:Processor board ID|Serial Number:?)\s+(\S+)").expect("serial")
});

static INTERFACE_ROW_IOS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^(\S+)\s+(\S+)\s+(?:YES|NO)\s+\S+\s+(administratively down|up|down|deleted)\s+(up|down)\s*$",
    )
    .expect("ios interface row")
});
static INTERFACE_ROW_NXOS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(\S+)\s+(\d{1,3}(?:\.\d{1,3}){3}|unassigned)\s+(\S+)/(\S+)/(\S+)\s*$")
        .expect("nxos interface row")
});

static CLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[*.]?(\d{1,2}:\d{2}:\d{2}(?:\.\d+)?)\s+(\S+)\s+(\w{3})\s+(\w{3})\s+(\d{1,2})\s+(\d{4})",
    )
    .expect("clock")
});

static INVENTORY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"NAME:\s*"([^"]*)",\s*DESCR:\s*"([^"]*)""#).expect("inventory name"));
static INVENTORY_PID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"PID:\s*([^,]*?)\s*,\s*VID:\s*([^,]*?)\s*,\s*SN:[ \t]*(\S*)")
        .expect("inventory pid")
});

/// Matches a command against a template, allowing each word to be
/// abbreviated the way device CLIs accept (`show ver`, `show ip int br`).
fn lookup(base_command: &str) -> Option<Template> {
    let key = normalize_command_key(base_command);
    let words: Vec<&str> = key.split(' ').collect();
    TEMPLATES.iter().find_map(|(pattern, template)| {
        let expected: Vec<&str> = pattern.split(' ').collect();
        let matches = expected.len() == words.len()
            && expected
                .iter()
                .zip(words.iter())
                .all(|(full, given)| !given.is_empty() && full.starts_with(given));
        matches.then_some(*template)
    })
}

fn capture(re: &Regex, raw: &str, group: usize) -> Option<String> {
    re.captures(raw)
        .and_then(|c| c.get(group))
        .map(|m| m.as_str().trim().to_string())
}

fn no_match(command: &str) -> ServiceError {
    ServiceError::parse(format!("Output of '{}' did not match the parser template", command))
}

fn parse_version(os: DeviceOs, raw: &str) -> Result<Value, ServiceError> {
    let version = VERSION_PATTERNS
        .iter()
        .filter(|(family, _)| match os {
            DeviceOs::Ios | DeviceOs::Iosxe => *family == DeviceOs::Ios,
            other => *family == other,
        })
        .chain(VERSION_PATTERNS.iter())
        .find_map(|(_, re)| capture(re, raw, 1));

    let mut out = Map::new();
    if let Some(version) = version {
        out.insert("version".to_string(), Value::String(version));
    }
    if let Some(caps) = UPTIME.captures(raw) {
        out.insert("hostname".to_string(), json!(caps[1].to_string()));
        out.insert("uptime".to_string(), json!(caps[2].to_string()));
    }
    for (field, re) in [("image", &*IMAGE), ("hardware", &*HARDWARE), ("serial", &*SERIAL)] {
        if let Some(value) = capture(re, raw, 1) {
            out.insert(field.to_string(), Value::String(value));
        }
    }
    if !out.contains_key("version") {
        return Err(no_match("show version"));
    }
    Ok(Value::Object(out))
}

fn parse_interface_brief(raw: &str) -> Result<Value, ServiceError> {
    let mut rows: Vec<Value> = INTERFACE_ROW_IOS
        .captures_iter(raw)
        .map(|c| {
            json!({
                "interface": &c[1],
                "ip_address": &c[2],
                "status": &c[3],
                "protocol": &c[4],
            })
        })
        .collect();
    if rows.is_empty() {
        rows = INTERFACE_ROW_NXOS
            .captures_iter(raw)
            .map(|c| {
                json!({
                    "interface": &c[1],
                    "ip_address": &c[2],
                    "status": &c[4],
                    "protocol": &c[3],
                })
            })
            .collect();
    }
    if rows.is_empty() {
        return Err(no_match("show ip interface brief"));
    }
    Ok(Value::Array(rows))
}

fn parse_clock(raw: &str) -> Result<Value, ServiceError> {
    let caps = CLOCK.captures(raw).ok_or_else(|| no_match("show clock"))?;
    Ok(json!({
        "time": &caps[1],
        "timezone": &caps[2],
        "day_of_week": &caps[3],
        "month": &caps[4],
        "day": caps[5].parse::<u32>().unwrap_or_default(),
        "year": caps[6].parse::<u32>().unwrap_or_default(),
    }))
}

/// Each PID line belongs to the NAME block it follows; a block without one
/// gets empty identifiers.
fn parse_inventory(raw: &str) -> Result<Value, ServiceError> {
    let names: Vec<_> = INVENTORY_NAME.captures_iter(raw).collect();
    if names.is_empty() {
        return Err(no_match("show inventory"));
    }
    let items = names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let block_start = name.get(0).map(|m| m.end()).unwrap_or_default();
            let block_end = names
                .get(idx + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(raw.len());
            let pid = INVENTORY_PID.captures(&raw[block_start..block_end]);
            let field = |group: usize| {
                pid.as_ref()
                    .and_then(|c| c.get(group))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            };
            json!({
                "name": &name[1],
                "description": &name[2],
                "pid": field(1),
                "vid": field(2),
                "serial": field(3),
            })
        })
        .collect();
    Ok(Value::Array(items))
}

/// Regex templates for the common read-only commands.
#[derive(Debug, Default, Clone)]
pub struct TemplateParser;

impl TemplateParser {
    pub fn new() -> Self {
        Self
    }

    pub fn supported_commands() -> Vec<&'static str> {
        TEMPLATES.iter().map(|(cmd, _)| *cmd).collect()
    }
}

impl OutputParser for TemplateParser {
    fn parse(&self, os: DeviceOs, base_command: &str, raw: &str) -> Result<Value, ServiceError> {
        let template = lookup(base_command).ok_or_else(|| {
            ServiceError::parse(format!(
                "No parser template for '{}' on {}",
                base_command.trim(),
                os.display_name()
            ))
        })?;
        if raw.trim().is_empty() {
            return Err(ServiceError::parse("Device returned empty output"));
        }
        match template {
            Template::Version => parse_version(os, raw),
            Template::IpInterfaceBrief => parse_interface_brief(raw),
            Template::Clock => parse_clock(raw),
            Template::Inventory => parse_inventory(raw),
        }
    }
}
