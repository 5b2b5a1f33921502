//! Batch orchestration: one request, many devices, many commands.
//!
//! Failures are contained at the narrowest scope that explains them. A bad
//! request or missing server configuration rejects the whole batch before any
//! connection is made; a device that cannot be reached fails only its own
//! entry; a failed command fails only its own result.

use crate::config::Settings;
use crate::constants::network::TIMEOUT_HARD_GRACE_MS;
use crate::errors::{ServiceError, ServiceErrorKind};
use crate::models::{
    aggregate, CommandResult, DeviceCredential, DeviceResult, ErrorEntry, ExecutionRequest,
    ExecutionRequestInput, ExecutionResponse, JumphostConfig, JumphostInput, JumphostTestResult,
    ShowCommand,
};
use crate::services::jumphost::JumphostRouter;
use crate::services::logger::Logger;
use crate::services::output_parser::OutputParser;
use crate::services::validation::Validation;
use crate::session::{DeviceConnector, DeviceSession, ProxyConnector};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct ExecutionManager {
    logger: Logger,
    validation: Validation,
    settings: Arc<Settings>,
    device_connector: Arc<dyn DeviceConnector>,
    proxy_connector: Arc<dyn ProxyConnector>,
    parser: Arc<dyn OutputParser>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return text.to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    "unknown panic".to_string()
}

fn hard_ceiling(timeout: Duration) -> Duration {
    timeout + Duration::from_millis(TIMEOUT_HARD_GRACE_MS)
}

impl ExecutionManager {
    pub fn new(
        logger: Logger,
        validation: Validation,
        settings: Arc<Settings>,
        device_connector: Arc<dyn DeviceConnector>,
        proxy_connector: Arc<dyn ProxyConnector>,
        parser: Arc<dyn OutputParser>,
    ) -> Self {
        Self {
            logger: logger.child("execute"),
            validation,
            settings,
            device_connector,
            proxy_connector,
            parser,
        }
    }

    /// Validates raw input and runs the batch.
    pub async fn execute(
        &self,
        input: &ExecutionRequestInput,
    ) -> Result<ExecutionResponse, ServiceError> {
        let request = self.validation.validate_request(input)?;
        self.run(request).await
    }

    /// The server-wide bastion that applies when a request asks for one.
    fn request_default(
        &self,
        request: &ExecutionRequest,
    ) -> Result<Option<JumphostConfig>, ServiceError> {
        if !request.use_jumphost {
            return Ok(None);
        }
        let Some(input) = self.settings.default_jumphost.as_ref() else {
            return Err(ServiceError::configuration(
                "use_jumphost is set but no default jumphost is configured",
            )
            .with_hint("Set JUMPHOST_HOST, JUMPHOST_USERNAME and JUMPHOST_KEY_PATH on the server, or give each device its own jumphost."));
        };
        self.validation
            .validate_jumphost(input)
            .map(Some)
            .map_err(|mut err| {
                err.kind = ServiceErrorKind::Configuration;
                err.message = format!("Default jumphost: {}", err.message);
                err
            })
    }

    pub async fn run(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ServiceError> {
        let default_jumphost = self.request_default(&request)?;
        let router = Arc::new(JumphostRouter::new(
            self.proxy_connector.clone(),
            default_jumphost,
            self.settings.jumphost_connect_timeout,
            self.logger.clone(),
        ));
        let request = Arc::new(request);
        let parallelism = self.settings.max_parallel_devices.max(1);
        let started = Instant::now();
        let batch_id = uuid::Uuid::new_v4().to_string();
        self.logger.info(
            "Executing batch",
            Some(&json!({
                "batch_id": batch_id,
                "devices": request.devices.len(),
                "commands": request.commands.len(),
                "timeout_seconds": request.timeout_seconds,
                "output_mode": request.output_mode,
                "parallelism": parallelism,
            })),
        );

        let device_results: Vec<DeviceResult> = stream::iter(request.devices.clone())
            .map(|device| {
                let manager = self.clone();
                let router = router.clone();
                let request = request.clone();
                async move {
                    manager
                        .run_device_isolated(&router, &device, &request)
                        .await
                }
            })
            .buffered(parallelism)
            .collect()
            .await;
        router.shutdown();

        let response = aggregate(device_results);
        self.logger.info(
            "Batch finished",
            Some(&json!({
                "batch_id": batch_id,
                "total_devices": response.total_devices,
                "successful_devices": response.successful_devices,
                "failed_devices": response.failed_devices,
                "duration_ms": started.elapsed().as_millis() as u64,
            })),
        );
        Ok(response)
    }

    async fn run_device_isolated(
        &self,
        router: &JumphostRouter,
        device: &DeviceCredential,
        request: &ExecutionRequest,
    ) -> DeviceResult {
        match AssertUnwindSafe(self.run_device(router, device, request))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.logger.error(
                    "Device processing panicked",
                    Some(&json!({"hostname": device.hostname(), "panic": message})),
                );
                DeviceResult::unreachable(
                    device.hostname(),
                    &ServiceError::internal(format!(
                        "Unexpected error while processing device: {}",
                        message
                    )),
                )
            }
        }
    }

    async fn run_device(
        &self,
        router: &JumphostRouter,
        device: &DeviceCredential,
        request: &ExecutionRequest,
    ) -> DeviceResult {
        let timeout = request.timeout();
        let proxy = match router.resolve(device).await {
            Ok(proxy) => proxy,
            Err(err) => return self.device_failed(device, err),
        };
        let opened = tokio::time::timeout(
            hard_ceiling(timeout),
            self.device_connector.open(device, proxy, timeout),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ServiceError::timeout(format!(
                "Connection to {} timed out after {}s",
                device.hostname(),
                request.timeout_seconds
            )))
        });
        let mut session = match opened {
            Ok(session) => session,
            Err(err) => return self.device_failed(device, err),
        };

        let mut command_results = Vec::with_capacity(request.commands.len());
        for command in &request.commands {
            let result = self
                .run_command_isolated(session.as_mut(), device, command, request)
                .await;
            command_results.push(result);
        }
        if AssertUnwindSafe(session.close()).catch_unwind().await.is_err() {
            self.logger.error(
                "Session close panicked",
                Some(&json!({"hostname": device.hostname()})),
            );
        }
        DeviceResult::connected(device.hostname(), command_results)
    }

    /// A panic while running one command fails only that command. The
    /// session stays open for the remaining commands and is closed by the
    /// caller.
    async fn run_command_isolated(
        &self,
        session: &mut dyn DeviceSession,
        device: &DeviceCredential,
        command: &ShowCommand,
        request: &ExecutionRequest,
    ) -> CommandResult {
        match AssertUnwindSafe(self.run_command(session, device, command, request))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let full_command = command.full_command();
                self.logger.error(
                    "Command processing panicked",
                    Some(&json!({
                        "hostname": device.hostname(),
                        "command": full_command,
                        "panic": message,
                    })),
                );
                CommandResult::failed(
                    full_command,
                    &ServiceError::internal(format!(
                        "Unexpected error while running command: {}",
                        message
                    )),
                )
            }
        }
    }

    fn device_failed(&self, device: &DeviceCredential, err: ServiceError) -> DeviceResult {
        self.logger.warn(
            "Device unreachable",
            Some(&json!({
                "hostname": device.hostname(),
                "kind": err.kind.as_str(),
                "error": err.message,
            })),
        );
        DeviceResult::unreachable(device.hostname(), &err)
    }

    async fn run_command(
        &self,
        session: &mut dyn DeviceSession,
        device: &DeviceCredential,
        command: &ShowCommand,
        request: &ExecutionRequest,
    ) -> CommandResult {
        let full_command = command.full_command();
        let timeout = request.timeout();
        let outcome = tokio::time::timeout(
            hard_ceiling(timeout),
            session.execute(&full_command, timeout),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ServiceError::timeout(format!(
                "Command '{}' timed out after {}s",
                full_command, request.timeout_seconds
            )))
        });

        let raw = match outcome {
            Ok(raw) => raw,
            Err(err) => {
                self.logger.warn(
                    "Command failed",
                    Some(&json!({
                        "hostname": device.hostname(),
                        "command": full_command,
                        "kind": err.kind.as_str(),
                        "error": err.message,
                    })),
                );
                return CommandResult::failed(full_command, &err);
            }
        };
        self.logger.debug(
            "Command completed",
            Some(&json!({
                "hostname": device.hostname(),
                "command": full_command,
                "bytes": raw.len(),
            })),
        );

        if !request.output_mode.wants_parsed() {
            return CommandResult::succeeded(full_command, raw);
        }
        let parsed = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.parser
                .parse(device.os_family(), command.base_command(), &raw)
        }))
        .unwrap_or_else(|payload| {
            Err(ServiceError::parse(format!(
                "Parser failed unexpectedly: {}",
                panic_message(payload.as_ref())
            )))
        });

        let mut result = CommandResult::succeeded(full_command, raw);
        match parsed {
            Ok(value) => {
                result.parsed_output = Some(value);
                if !request.output_mode.wants_raw() {
                    result.raw_output = None;
                }
            }
            Err(err) => result.parse_error = Some(err.message),
        }
        result
    }

    /// Connects to a bastion and disconnects again. Never touches devices.
    pub async fn test_jumphost(
        &self,
        input: &JumphostInput,
    ) -> Result<JumphostTestResult, ServiceError> {
        let config = self.validation.validate_jumphost(input)?;
        let key = config.key();
        self.logger
            .info("Testing jumphost", Some(&json!({"jumphost": key.to_string()})));
        let outcome = self
            .proxy_connector
            .connect(&config, self.settings.jumphost_connect_timeout)
            .await;
        let (succeeded, message, error) = match outcome {
            Ok(connection) => {
                connection.close();
                (
                    true,
                    format!("Jumphost connection to {} succeeded", key),
                    None,
                )
            }
            Err(err) => {
                self.logger.warn(
                    "Jumphost test failed",
                    Some(&json!({"jumphost": key.to_string(), "error": err.message})),
                );
                (
                    false,
                    format!("Jumphost connection to {} failed", key),
                    Some(ErrorEntry::from(&err)),
                )
            }
        };
        Ok(JumphostTestResult {
            host: key.host,
            port: key.port,
            username: key.username,
            succeeded,
            message,
            error,
        })
    }
}
