#![allow(dead_code)]

use async_trait::async_trait;
use netshow::app::App;
use netshow::config::Settings;
use netshow::errors::ServiceError;
use netshow::models::{DeviceCredential, JumphostConfig, JumphostKey};
use netshow::services::logger::{LogLevel, Logger};
use netshow::services::output_parser::TemplateParser;
use netshow::session::{DeviceConnector, DeviceSession, ProxyConnection, ProxyConnector};
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SHOW_VERSION_IOS: &str = "Cisco IOS Software, C2960 Software (C2960-LANBASEK9-M), Version 15.0(2)SE11, RELEASE SOFTWARE (fc3)\n\
router1 uptime is 2 weeks, 3 days, 4 hours, 5 minutes\n\
System image file is \"flash:c2960-lanbasek9-mz.150-2.SE11.bin\"\n";

/// What a scripted command does when executed.
#[derive(Clone)]
pub enum Reply {
    Output(String),
    Fail(ServiceError),
    /// Waits out the caller's timeout, then reports it.
    Stall,
    /// Ignores the timeout it was given and never answers in time.
    Hang,
    Panic,
}

#[derive(Clone, Default)]
pub struct DeviceScript {
    pub connect_error: Option<ServiceError>,
    pub connect_delay: Option<Duration>,
    pub replies: HashMap<String, Reply>,
}

impl DeviceScript {
    pub fn reply(mut self, command: &str, reply: Reply) -> Self {
        self.replies.insert(command.to_string(), reply);
        self
    }

    pub fn unreachable(err: ServiceError) -> Self {
        Self {
            connect_error: Some(err),
            ..Self::default()
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }
}

/// Everything the fake transports observed.
#[derive(Default)]
pub struct Journal {
    pub opened: Mutex<Vec<(String, Option<JumphostKey>)>>,
    pub executed: Mutex<Vec<(String, String)>>,
    pub sessions_closed: AtomicUsize,
    pub proxy_connects: AtomicUsize,
    pub proxies_closed: AtomicUsize,
}

impl Journal {
    pub fn opened_hosts(&self) -> Vec<String> {
        self.opened
            .lock()
            .expect("journal")
            .iter()
            .map(|(host, _)| host.clone())
            .collect()
    }

    pub fn proxy_for(&self, hostname: &str) -> Option<JumphostKey> {
        self.opened
            .lock()
            .expect("journal")
            .iter()
            .find(|(host, _)| host == hostname)
            .and_then(|(_, key)| key.clone())
    }

    pub fn commands_on(&self, hostname: &str) -> Vec<String> {
        self.executed
            .lock()
            .expect("journal")
            .iter()
            .filter(|(host, _)| host == hostname)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }
}

pub struct FakeDeviceConnector {
    scripts: HashMap<String, DeviceScript>,
    journal: Arc<Journal>,
}

impl FakeDeviceConnector {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            scripts: HashMap::new(),
            journal,
        }
    }

    pub fn device(mut self, hostname: &str, script: DeviceScript) -> Self {
        self.scripts.insert(hostname.to_string(), script);
        self
    }
}

#[async_trait]
impl DeviceConnector for FakeDeviceConnector {
    async fn open(
        &self,
        device: &DeviceCredential,
        proxy: Option<Arc<dyn ProxyConnection>>,
        _timeout: Duration,
    ) -> Result<Box<dyn DeviceSession>, ServiceError> {
        let script = self
            .scripts
            .get(device.hostname())
            .cloned()
            .unwrap_or_default();
        if let Some(delay) = script.connect_delay {
            tokio::time::sleep(delay).await;
        }
        self.journal.opened.lock().expect("journal").push((
            device.hostname().to_string(),
            proxy.as_ref().map(|p| p.key().clone()),
        ));
        if let Some(err) = script.connect_error {
            return Err(err);
        }
        Ok(Box::new(FakeSession {
            hostname: device.hostname().to_string(),
            replies: script.replies,
            journal: self.journal.clone(),
        }))
    }
}

struct FakeSession {
    hostname: String,
    replies: HashMap<String, Reply>,
    journal: Arc<Journal>,
}

#[async_trait]
impl DeviceSession for FakeSession {
    async fn execute(&mut self, command: &str, timeout: Duration) -> Result<String, ServiceError> {
        self.journal
            .executed
            .lock()
            .expect("journal")
            .push((self.hostname.clone(), command.to_string()));
        match self.replies.get(command).cloned() {
            Some(Reply::Output(text)) => Ok(text),
            Some(Reply::Fail(err)) => Err(err),
            Some(Reply::Stall) => {
                tokio::time::sleep(timeout).await;
                Err(ServiceError::timeout(format!(
                    "Command '{}' timed out after {}s",
                    command,
                    timeout.as_secs()
                )))
            }
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
            Some(Reply::Panic) => panic!("session state corrupted"),
            None => Ok(format!("{}#{}\n", self.hostname, command)),
        }
    }

    async fn close(&mut self) {
        self.journal.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeProxy {
    key: JumphostKey,
    journal: Arc<Journal>,
}

impl ProxyConnection for FakeProxy {
    fn key(&self) -> &JumphostKey {
        &self.key
    }

    fn open_channel(
        &self,
        host: &str,
        port: u16,
        _timeout: Duration,
    ) -> Result<TcpStream, ServiceError> {
        Err(ServiceError::connection(format!(
            "fake proxy cannot reach {}:{}",
            host, port
        )))
    }

    fn close(&self) {
        self.journal.proxies_closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeProxyConnector {
    journal: Arc<Journal>,
    refuse: Option<ServiceError>,
}

impl FakeProxyConnector {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            refuse: None,
        }
    }

    pub fn refusing(journal: Arc<Journal>, err: ServiceError) -> Self {
        Self {
            journal,
            refuse: Some(err),
        }
    }
}

#[async_trait]
impl ProxyConnector for FakeProxyConnector {
    async fn connect(
        &self,
        config: &JumphostConfig,
        _timeout: Duration,
    ) -> Result<Arc<dyn ProxyConnection>, ServiceError> {
        self.journal.proxy_connects.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if let Some(err) = &self.refuse {
            return Err(err.clone());
        }
        Ok(Arc::new(FakeProxy {
            key: config.key(),
            journal: self.journal.clone(),
        }))
    }
}

pub fn quiet_logger() -> Logger {
    Logger::with_level("netshow-test", LogLevel::Error)
}

pub fn build_app(
    settings: Settings,
    devices: FakeDeviceConnector,
    proxies: FakeProxyConnector,
) -> App {
    App::from_components(
        quiet_logger(),
        settings,
        Arc::new(devices),
        Arc::new(proxies),
        Arc::new(TemplateParser::new()),
    )
}

/// An app whose devices all answer with their default echo output.
pub fn default_app(journal: Arc<Journal>) -> App {
    build_app(
        Settings::default(),
        FakeDeviceConnector::new(journal.clone()),
        FakeProxyConnector::new(journal),
    )
}
