use crate::config::Settings;
use crate::errors::ServiceError;
use crate::managers::execution::ExecutionManager;
use crate::services::logger::Logger;
use crate::services::output_parser::{OutputParser, TemplateParser};
use crate::services::validation::Validation;
use crate::session::{DeviceConnector, ProxyConnector, SshDeviceConnector, SshProxyConnector};
use std::sync::Arc;

/// Process-wide wiring shared by the HTTP and MCP front ends.
#[derive(Clone)]
pub struct App {
    pub logger: Logger,
    pub settings: Arc<Settings>,
    pub execution_manager: Arc<ExecutionManager>,
}

impl App {
    pub fn initialize() -> Result<Self, ServiceError> {
        let logger = Logger::new("netshow");
        let settings = Settings::from_env()?;
        let device_connector = Arc::new(SshDeviceConnector::new(logger.clone()));
        let proxy_connector = Arc::new(SshProxyConnector::new(logger.clone()));
        let app = Self::from_components(
            logger,
            settings,
            device_connector,
            proxy_connector,
            Arc::new(TemplateParser::new()),
        );
        app.logger.info(
            "Initialized",
            Some(&serde_json::json!({
                "max_parallel_devices": app.settings.max_parallel_devices,
                "default_jumphost": app.settings.default_jumphost.is_some(),
            })),
        );
        Ok(app)
    }

    /// Wires an app around explicit transports; tests pass in fakes here.
    pub fn from_components(
        logger: Logger,
        settings: Settings,
        device_connector: Arc<dyn DeviceConnector>,
        proxy_connector: Arc<dyn ProxyConnector>,
        parser: Arc<dyn OutputParser>,
    ) -> Self {
        let settings = Arc::new(settings);
        let execution_manager = Arc::new(ExecutionManager::new(
            logger.clone(),
            Validation::new(),
            settings.clone(),
            device_connector,
            proxy_connector,
            parser,
        ));
        Self {
            logger,
            settings,
            execution_manager,
        }
    }
}
