use crate::constants::commands::SUPPORTED_OS_FAMILIES;
use crate::constants::limits::{
    DEFAULT_TIMEOUT_SECONDS, MAX_COMMANDS_PER_REQUEST, MAX_DEVICES_PER_REQUEST,
    MAX_HOSTNAME_LENGTH, MAX_KEY_PATH_LENGTH, MAX_PASSWORD_LENGTH, MAX_PORT, MAX_TIMEOUT_SECONDS,
    MAX_USERNAME_LENGTH, MIN_PORT, MIN_TIMEOUT_SECONDS,
};
use crate::constants::network::SSH_DEFAULT_PORT;
use crate::errors::ServiceError;
use crate::models::{
    DeviceCredential, DeviceInput, DeviceOs, ExecutionRequest, ExecutionRequestInput,
    JumphostConfig, JumphostInput, OutputMode, ShowCommand, ShowCommandInput,
};
use crate::services::command_policy;
use once_cell::sync::Lazy;
use regex::Regex;

static HOSTNAME_GRAMMAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9.\-:]+$").expect("hostname grammar"));

const JUNOS_REJECTION: &str = "JunOS is not supported: Junos filters output with '| match' and \
'| except', an incompatible filter syntax with the include/exclude/begin/section pipe filters \
this service applies, so its results would be silently mis-filtered";

/// Connection-parameter validation. Pure; every method either returns the
/// normalized value or a single `InvalidParams` error describing the first
/// violation.
#[derive(Clone)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    pub fn ensure_bounded(
        &self,
        value: &str,
        label: &str,
        max_length: usize,
        trim: bool,
    ) -> Result<String, ServiceError> {
        let normalized = if trim { value.trim() } else { value };
        if normalized.trim().is_empty() {
            return Err(ServiceError::invalid_params(format!(
                "{} cannot be empty",
                label
            )));
        }
        if normalized.chars().count() > max_length {
            return Err(ServiceError::invalid_params(format!(
                "{} exceeds maximum length of {} characters",
                label, max_length
            )));
        }
        Ok(normalized.to_string())
    }

    pub fn ensure_hostname(&self, value: &str, label: &str) -> Result<String, ServiceError> {
        let hostname = self.ensure_bounded(value, label, MAX_HOSTNAME_LENGTH, true)?;
        if !HOSTNAME_GRAMMAR.is_match(&hostname) {
            return Err(ServiceError::invalid_params(format!(
                "{} may only contain letters, digits, '.', '-' and ':'",
                label
            )));
        }
        Ok(hostname)
    }

    pub fn ensure_port(&self, value: Option<i64>, fallback: u16) -> Result<u16, ServiceError> {
        let Some(numeric) = value else {
            return Ok(fallback);
        };
        if numeric < MIN_PORT as i64 || numeric > MAX_PORT as i64 {
            return Err(ServiceError::invalid_params(format!(
                "Port must be between {} and {}",
                MIN_PORT, MAX_PORT
            )));
        }
        Ok(numeric as u16)
    }

    pub fn ensure_os_family(&self, value: &str) -> Result<DeviceOs, ServiceError> {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ServiceError::invalid_params("os_family cannot be empty"));
        }
        if let Some(os) = DeviceOs::from_name(&normalized) {
            return Ok(os);
        }
        let supported = SUPPORTED_OS_FAMILIES.join(", ");
        if normalized == "junos" {
            return Err(ServiceError::invalid_params(format!(
                "{} (os_family '{}'). Supported families: {}",
                JUNOS_REJECTION,
                value.trim(),
                supported
            ))
            .with_hint("This is a deliberate exclusion, not a bug."));
        }
        Err(ServiceError::invalid_params(format!(
            "Unsupported os_family '{}'; expected one of {}",
            value.trim(),
            supported
        )))
    }

    pub fn ensure_timeout(&self, value: Option<i64>) -> Result<u64, ServiceError> {
        let Some(seconds) = value else {
            return Ok(DEFAULT_TIMEOUT_SECONDS);
        };
        if seconds < MIN_TIMEOUT_SECONDS as i64 || seconds > MAX_TIMEOUT_SECONDS as i64 {
            return Err(ServiceError::invalid_params(format!(
                "Timeout must be between {} and {} seconds",
                MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS
            )));
        }
        Ok(seconds as u64)
    }

    pub fn ensure_output_mode(&self, value: Option<&str>) -> Result<OutputMode, ServiceError> {
        let Some(raw) = value.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(OutputMode::default());
        };
        OutputMode::from_name(raw).ok_or_else(|| {
            ServiceError::invalid_params(format!(
                "Unsupported output_mode '{}'; expected one of raw, parsed, both",
                raw
            ))
        })
    }

    /// A jumphost is only usable when every field is present; absent fields
    /// are a configuration error naming them, malformed fields a validation
    /// error.
    pub fn validate_jumphost(&self, input: &JumphostInput) -> Result<JumphostConfig, ServiceError> {
        let present = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        let mut missing = Vec::new();
        if !present(&input.host) {
            missing.push("host");
        }
        if !present(&input.username) {
            missing.push("username");
        }
        if !present(&input.key_path) {
            missing.push("key_path");
        }
        if !missing.is_empty() {
            return Err(ServiceError::configuration(format!(
                "Jumphost configuration is incomplete: missing {}",
                missing.join(", ")
            ))
            .with_details(serde_json::json!({"missing": missing})));
        }

        let host = self.ensure_hostname(input.host.as_deref().unwrap_or_default(), "Jumphost host")?;
        let port = self.ensure_port(input.port, SSH_DEFAULT_PORT)?;
        let username = self.ensure_bounded(
            input.username.as_deref().unwrap_or_default(),
            "Jumphost username",
            MAX_USERNAME_LENGTH,
            true,
        )?;
        let key_path = self.ensure_bounded(
            input.key_path.as_deref().unwrap_or_default(),
            "Jumphost key_path",
            MAX_KEY_PATH_LENGTH,
            true,
        )?;
        Ok(JumphostConfig::new(host, port, username, key_path))
    }

    pub fn validate_device(&self, input: &DeviceInput) -> Result<DeviceCredential, ServiceError> {
        let hostname = self.ensure_hostname(&input.hostname, "Hostname")?;
        let port = self.ensure_port(input.port, SSH_DEFAULT_PORT)?;
        let username =
            self.ensure_bounded(&input.username, "Username", MAX_USERNAME_LENGTH, true)?;
        let password =
            self.ensure_bounded(&input.password, "Password", MAX_PASSWORD_LENGTH, false)?;
        let os_family = self.ensure_os_family(&input.os_family)?;
        let enable_password = match input.enable_password.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(self.ensure_bounded(
                raw,
                "Enable password",
                MAX_PASSWORD_LENGTH,
                false,
            )?),
        };
        let jumphost = input
            .jumphost
            .as_ref()
            .map(|j| self.validate_jumphost(j))
            .transpose()?;
        Ok(DeviceCredential::new(
            hostname,
            port,
            username,
            password,
            os_family,
            enable_password,
            jumphost,
        ))
    }

    pub fn validate_command(&self, input: &ShowCommandInput) -> Result<ShowCommand, ServiceError> {
        let operator = command_policy::parse_pipe_operator(input.pipe_operator.as_deref())?;
        ShowCommand::new(&input.command, operator, input.pipe_value.as_deref())
    }

    /// Validates the whole batch before any network activity. The first
    /// invalid device or command rejects the request; its position is
    /// reported in `details`.
    pub fn validate_request(
        &self,
        input: &ExecutionRequestInput,
    ) -> Result<ExecutionRequest, ServiceError> {
        if input.devices.is_empty() {
            return Err(ServiceError::invalid_params("At least one device is required"));
        }
        if input.devices.len() > MAX_DEVICES_PER_REQUEST {
            return Err(ServiceError::invalid_params(format!(
                "A request may target at most {} devices",
                MAX_DEVICES_PER_REQUEST
            )));
        }
        if input.commands.is_empty() {
            return Err(ServiceError::invalid_params("At least one command is required"));
        }
        if input.commands.len() > MAX_COMMANDS_PER_REQUEST {
            return Err(ServiceError::invalid_params(format!(
                "A request may contain at most {} commands",
                MAX_COMMANDS_PER_REQUEST
            )));
        }

        let mut devices = Vec::with_capacity(input.devices.len());
        for (index, device) in input.devices.iter().enumerate() {
            let validated = self.validate_device(device).map_err(|err| {
                err.with_details(serde_json::json!({"device_index": index}))
            })?;
            devices.push(validated);
        }
        let mut commands = Vec::with_capacity(input.commands.len());
        for (index, command) in input.commands.iter().enumerate() {
            let validated = self.validate_command(command).map_err(|err| {
                err.with_details(serde_json::json!({"command_index": index}))
            })?;
            commands.push(validated);
        }

        Ok(ExecutionRequest {
            devices,
            commands,
            timeout_seconds: self.ensure_timeout(input.timeout_seconds)?,
            output_mode: self.ensure_output_mode(input.output_mode.as_deref())?,
            use_jumphost: input.use_jumphost,
        })
    }
}

impl Default for Validation {
    fn default() -> Self {
        Self::new()
    }
}
