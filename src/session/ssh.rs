use super::{DeviceConnector, DeviceSession, ProxyConnection, ProxyConnector};
use crate::constants::limits::MAX_CAPTURE_BYTES;
use crate::constants::network::{
    KEEPALIVE_INTERVAL_SECS, TIMEOUT_HARD_GRACE_MS, TUNNEL_BUFFER_BYTES, TUNNEL_IDLE_SLEEP_MS,
};
use crate::errors::ServiceError;
use crate::models::{DeviceCredential, JumphostConfig, JumphostKey};
use crate::services::key_loader::{load_private_key, PrivateKey};
use crate::services::logger::Logger;
use crate::utils::redact::redact_text;
use crate::utils::text::decode_device_output;
use async_trait::async_trait;
use serde_json::json;
use ssh2::{Channel, Session};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const LIBSSH2_ERROR_EAGAIN: i32 = -37;
const DISCONNECT_TIMEOUT_MS: u32 = 2_000;
const REJECTION_MARKERS: &[&str] = &[
    "% Invalid input",
    "% Incomplete command",
    "% Ambiguous command",
    "% Unknown command",
];

type Failure = fn(String) -> ServiceError;

fn map_ssh_error(err: ssh2::Error, failure: Failure, context: &str) -> ServiceError {
    let io_err: std::io::Error = err.into();
    match io_err.kind() {
        ErrorKind::TimedOut => ServiceError::timeout(format!("{}: operation timed out", context)),
        _ => failure(format!("{}: {}", context, io_err)),
    }
}

fn map_io_error(err: std::io::Error, failure: Failure, context: &str) -> ServiceError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            ServiceError::timeout(format!("{}: operation timed out", context))
        }
        _ => failure(format!("{}: {}", context, err)),
    }
}

fn is_would_block(err: &ssh2::Error) -> bool {
    matches!(err.code(), ssh2::ErrorCode::Session(LIBSSH2_ERROR_EAGAIN))
}

fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX).max(1)
}

/// Joins a blocking task under a hard ceiling slightly above `timeout`.
/// libssh2 enforces the soft timeout; the ceiling covers a wedged socket.
async fn join_with_ceiling<T>(
    handle: JoinHandle<Result<T, ServiceError>>,
    timeout: Duration,
    what: &str,
) -> Result<T, ServiceError> {
    let ceiling = timeout + Duration::from_millis(TIMEOUT_HARD_GRACE_MS);
    match tokio::time::timeout(ceiling, handle).await {
        Err(_) => Err(ServiceError::timeout(format!(
            "{} timed out after {}s",
            what,
            timeout.as_secs()
        ))),
        Ok(Err(join_err)) => Err(ServiceError::internal(format!(
            "{} task failed: {}",
            what, join_err
        ))),
        Ok(Ok(result)) => result,
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, ServiceError> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|err| {
            ServiceError::connection(format!("Failed to resolve {}:{}: {}", host, port, err))
        })?
        .collect();
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_error = Some(err),
        }
    }
    Err(match last_error {
        Some(err) => map_io_error(
            err,
            ServiceError::connection,
            &format!("Failed to connect to {}:{}", host, port),
        ),
        None => ServiceError::connection(format!("No address found for {}:{}", host, port)),
    })
}

fn start_session(tcp: TcpStream, timeout: Duration, context: &str) -> Result<Session, ServiceError> {
    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();
    let mut session = Session::new()
        .map_err(|_| ServiceError::internal("Failed to create SSH session"))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout_ms(timeout));
    session
        .handshake()
        .map_err(|err| map_ssh_error(err, ServiceError::connection, context))?;
    Ok(session)
}

// ---------------------------------------------------------------------------
// Jumphost
// ---------------------------------------------------------------------------

/// Connects to bastions with key authentication.
pub struct SshProxyConnector {
    logger: Logger,
}

impl SshProxyConnector {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("jumphost"),
        }
    }
}

#[async_trait]
impl ProxyConnector for SshProxyConnector {
    async fn connect(
        &self,
        config: &JumphostConfig,
        timeout: Duration,
    ) -> Result<Arc<dyn ProxyConnection>, ServiceError> {
        let key = load_private_key(config.key_path())?;
        self.logger.info(
            "Connecting to jumphost",
            Some(&json!({
                "host": config.host(),
                "port": config.port(),
                "username": config.username(),
                "key_kind": key.kind(),
                "key_path": key.path().display().to_string(),
            })),
        );
        let config = config.clone();
        let logger = self.logger.clone();
        let what = format!("Jumphost connection to {}", config.key());
        let handle =
            tokio::task::spawn_blocking(move || connect_jumphost(&config, &key, timeout, logger));
        let connection = join_with_ceiling(handle, timeout, &what).await?;
        Ok(Arc::new(connection))
    }
}

fn connect_jumphost(
    config: &JumphostConfig,
    key: &PrivateKey,
    timeout: Duration,
    logger: Logger,
) -> Result<SshProxyConnection, ServiceError> {
    let identity = config.key();
    let context = format!("Jumphost {}", identity);
    let tcp = connect_tcp(config.host(), config.port(), timeout)?;
    let session = start_session(tcp, timeout, &context)?;
    session
        .userauth_pubkey_memory(config.username(), None, key.pem(), None)
        .map_err(|err| map_ssh_error(err, ServiceError::connection, &context))?;
    if !session.authenticated() {
        return Err(ServiceError::connection(format!(
            "Jumphost authentication failed for {}",
            identity
        )));
    }
    session.set_keepalive(true, KEEPALIVE_INTERVAL_SECS);
    // tunnels share the session; every call must return instead of parking
    session.set_blocking(false);
    logger.info(
        "Jumphost connection established",
        Some(&json!({"jumphost": identity.to_string()})),
    );
    Ok(SshProxyConnection {
        key: identity,
        session,
        closed: Arc::new(AtomicBool::new(false)),
        logger,
    })
}

pub struct SshProxyConnection {
    key: JumphostKey,
    session: Session,
    closed: Arc<AtomicBool>,
    logger: Logger,
}

impl SshProxyConnection {
    fn open_direct_channel(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Channel, ServiceError> {
        let deadline = Instant::now() + timeout;
        let context = format!("Tunnel to {}:{} via {}", host, port, self.key);
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(ServiceError::connection(format!(
                    "Jumphost {} is closed",
                    self.key
                )));
            }
            match self.session.channel_direct_tcpip(host, port, None) {
                Ok(channel) => return Ok(channel),
                Err(err) if is_would_block(&err) => {
                    if Instant::now() >= deadline {
                        return Err(ServiceError::timeout(format!(
                            "{}: operation timed out",
                            context
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(TUNNEL_IDLE_SLEEP_MS));
                }
                Err(err) => return Err(map_ssh_error(err, ServiceError::connection, &context)),
            }
        }
    }
}

impl ProxyConnection for SshProxyConnection {
    fn key(&self) -> &JumphostKey {
        &self.key
    }

    fn open_channel(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<TcpStream, ServiceError> {
        let channel = self.open_direct_channel(host, port, timeout)?;
        let bridge_error =
            |err: std::io::Error| ServiceError::internal(format!("Tunnel bridge failed: {}", err));
        let listener = TcpListener::bind(("127.0.0.1", 0)).map_err(bridge_error)?;
        let local_addr = listener.local_addr().map_err(bridge_error)?;
        let device_side = TcpStream::connect(local_addr).map_err(bridge_error)?;
        let (pump_side, _) = listener.accept().map_err(bridge_error)?;

        let closed = self.closed.clone();
        let logger = self.logger.clone();
        let target = format!("{}:{}", host, port);
        std::thread::Builder::new()
            .name(format!("netshow-tunnel-{}", target))
            .spawn(move || {
                if let Err(err) = pump_tunnel(channel, pump_side, &closed) {
                    logger.debug(
                        "Tunnel closed with error",
                        Some(&json!({"target": target, "error": err.to_string()})),
                    );
                }
            })
            .map_err(bridge_error)?;
        self.logger.debug(
            "Tunnel opened",
            Some(&json!({
                "jumphost": self.key.to_string(),
                "target": format!("{}:{}", host, port),
            })),
        );
        Ok(device_side)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let session = self.session.clone();
        let logger = self.logger.clone();
        let jumphost = self.key.to_string();
        run_detached(move || {
            session.set_blocking(true);
            session.set_timeout(DISCONNECT_TIMEOUT_MS);
            match session.disconnect(None, "netshow shutdown", None) {
                Ok(()) => {
                    logger.info("Jumphost disconnected", Some(&json!({"jumphost": jumphost})))
                }
                Err(err) => logger.warn(
                    "Jumphost disconnect failed",
                    Some(&json!({"jumphost": jumphost, "error": err.to_string()})),
                ),
            }
        });
    }
}

impl Drop for SshProxyConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn write_fully<W: Write>(
    target: &mut W,
    mut data: &[u8],
    closed: &AtomicBool,
) -> std::io::Result<()> {
    while !data.is_empty() {
        if closed.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(ErrorKind::BrokenPipe, "tunnel closed"));
        }
        match target.write(data) {
            Ok(0) => return Err(std::io::Error::new(ErrorKind::WriteZero, "peer closed")),
            Ok(n) => data = &data[n..],
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(TUNNEL_IDLE_SLEEP_MS));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Copies bytes between the forwarded channel and the local bridge socket
/// until either side closes or the jumphost shuts down.
fn pump_tunnel(
    mut channel: Channel,
    mut local: TcpStream,
    closed: &AtomicBool,
) -> std::io::Result<()> {
    local.set_nonblocking(true)?;
    let mut buf = vec![0u8; TUNNEL_BUFFER_BYTES];
    let result = loop {
        if closed.load(Ordering::SeqCst) {
            break Ok(());
        }
        let mut progressed = false;

        match local.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) => {
                if let Err(err) = write_fully(&mut channel, &buf[..n], closed) {
                    break Err(err);
                }
                progressed = true;
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => break Err(err),
        }

        match channel.read(&mut buf) {
            Ok(0) => {
                if channel.eof() {
                    break Ok(());
                }
            }
            Ok(n) => {
                if let Err(err) = write_fully(&mut local, &buf[..n], closed) {
                    break Err(err);
                }
                progressed = true;
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => break Err(err),
        }

        if !progressed {
            std::thread::sleep(Duration::from_millis(TUNNEL_IDLE_SLEEP_MS));
        }
    };
    let _ = channel.send_eof();
    let _ = channel.close();
    let _ = local.shutdown(std::net::Shutdown::Both);
    result
}

// ---------------------------------------------------------------------------
// Devices
// ---------------------------------------------------------------------------

/// Opens password-authenticated sessions to devices, directly or through a
/// jumphost tunnel.
pub struct SshDeviceConnector {
    logger: Logger,
}

impl SshDeviceConnector {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("device"),
        }
    }
}

#[async_trait]
impl DeviceConnector for SshDeviceConnector {
    async fn open(
        &self,
        device: &DeviceCredential,
        proxy: Option<Arc<dyn ProxyConnection>>,
        timeout: Duration,
    ) -> Result<Box<dyn DeviceSession>, ServiceError> {
        self.logger.info(
            "Connecting to device",
            Some(&json!({
                "hostname": device.hostname(),
                "port": device.port(),
                "os_family": device.os_family().as_str(),
                "via": proxy.as_ref().map(|p| p.key().to_string()),
            })),
        );
        let credential = device.clone();
        let what = format!("Connection to {}", device.hostname());
        let handle = tokio::task::spawn_blocking(move || {
            connect_device(&credential, proxy.as_deref(), timeout)
        });
        let session = join_with_ceiling(handle, timeout, &what)
            .await
            .map_err(|err| scrub(err, device))?;
        Ok(Box::new(SshDeviceSession {
            hostname: device.hostname().to_string(),
            session: Some(session),
            enable_password: device.enable_password().map(str::to_string),
            secrets: device.secrets(),
            logger: self.logger.clone(),
        }))
    }
}

fn scrub(mut err: ServiceError, device: &DeviceCredential) -> ServiceError {
    let secrets = device.secrets();
    err.message = redact_text(&err.message, usize::MAX, Some(secrets.as_slice()));
    err
}

fn connect_device(
    device: &DeviceCredential,
    proxy: Option<&dyn ProxyConnection>,
    timeout: Duration,
) -> Result<Session, ServiceError> {
    let context = format!("Device {}:{}", device.hostname(), device.port());
    let tcp = match proxy {
        Some(proxy) => proxy.open_channel(device.hostname(), device.port(), timeout)?,
        None => connect_tcp(device.hostname(), device.port(), timeout)?,
    };
    let session = start_session(tcp, timeout, &context)?;
    session
        .userauth_password(device.username(), device.password())
        .map_err(|err| match map_ssh_error(err, ServiceError::connection, &context) {
            timeout_err if timeout_err.kind == crate::errors::ServiceErrorKind::Timeout => {
                timeout_err
            }
            _ => ServiceError::connection(format!(
                "Authentication failed for {}@{}",
                device.username(),
                device.hostname()
            )),
        })?;
    if !session.authenticated() {
        return Err(ServiceError::connection(format!(
            "Authentication failed for {}@{}",
            device.username(),
            device.hostname()
        )));
    }
    session.set_keepalive(true, KEEPALIVE_INTERVAL_SECS);
    Ok(session)
}

pub struct SshDeviceSession {
    hostname: String,
    session: Option<Session>,
    enable_password: Option<String>,
    secrets: Vec<String>,
    logger: Logger,
}

#[async_trait]
impl DeviceSession for SshDeviceSession {
    async fn execute(&mut self, command: &str, timeout: Duration) -> Result<String, ServiceError> {
        let session = self.session.clone().ok_or_else(|| {
            ServiceError::execution(format!("Session to {} is closed", self.hostname))
        })?;
        let enable = self.enable_password.clone();
        let owned = command.to_string();
        let handle = tokio::task::spawn_blocking(move || {
            exec_blocking(&session, &owned, enable.as_deref(), timeout)
        });
        let what = format!("Command '{}' on {}", command, self.hostname);
        join_with_ceiling(handle, timeout, &what)
            .await
            .map_err(|mut err| {
                err.message = redact_text(&err.message, usize::MAX, Some(self.secrets.as_slice()));
                err
            })
    }

    async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let hostname = self.hostname.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            session.set_timeout(DISCONNECT_TIMEOUT_MS);
            session.disconnect(None, "netshow done", None)
        })
        .await;
        match outcome {
            Ok(Ok(())) => self
                .logger
                .debug("Device session closed", Some(&json!({"hostname": hostname}))),
            Ok(Err(err)) => self.logger.warn(
                "Device disconnect failed",
                Some(&json!({"hostname": hostname, "error": err.to_string()})),
            ),
            Err(err) => self.logger.warn(
                "Device disconnect task failed",
                Some(&json!({"hostname": hostname, "error": err.to_string()})),
            ),
        }
    }
}

impl Drop for SshDeviceSession {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let logger = self.logger.clone();
        let hostname = self.hostname.clone();
        run_detached(move || {
            session.set_timeout(DISCONNECT_TIMEOUT_MS);
            if let Err(err) = session.disconnect(None, "netshow session dropped", None) {
                logger.debug(
                    "Dropped device session disconnect failed",
                    Some(&json!({"hostname": hostname, "error": err.to_string()})),
                );
            }
        });
    }
}

/// Runs blocking teardown off the async workers. Outside a runtime a
/// short-lived thread is used instead.
fn run_detached<F>(task: F)
where
    F: FnOnce() + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(task);
        }
        Err(_) => {
            let _ = std::thread::Builder::new()
                .name("netshow-disconnect".to_string())
                .spawn(task);
        }
    }
}

fn exec_blocking(
    session: &Session,
    command: &str,
    enable_password: Option<&str>,
    timeout: Duration,
) -> Result<String, ServiceError> {
    let context = format!("Command '{}'", command);
    session.set_timeout(timeout_ms(timeout));
    let mut channel = session
        .channel_session()
        .map_err(|err| map_ssh_error(err, ServiceError::execution, &context))?;

    match enable_password {
        None => channel
            .exec(command)
            .map_err(|err| map_ssh_error(err, ServiceError::execution, &context))?,
        Some(secret) => {
            channel
                .request_pty("vt100", None, None)
                .map_err(|err| map_ssh_error(err, ServiceError::execution, &context))?;
            channel
                .shell()
                .map_err(|err| map_ssh_error(err, ServiceError::execution, &context))?;
            let script = format!("enable\n{}\nterminal length 0\n{}\nexit\n", secret, command);
            channel
                .write_all(script.as_bytes())
                .map_err(|err| map_io_error(err, ServiceError::execution, &context))?;
        }
    }

    let mut stdout = Vec::new();
    (&mut channel)
        .take(MAX_CAPTURE_BYTES as u64)
        .read_to_end(&mut stdout)
        .map_err(|err| map_io_error(err, ServiceError::execution, &context))?;
    let truncated = stdout.len() >= MAX_CAPTURE_BYTES;
    let mut stderr = Vec::new();
    if !truncated {
        let _ = channel.stderr().take(MAX_CAPTURE_BYTES as u64).read_to_end(&mut stderr);
    }
    let _ = channel.send_eof();
    let _ = channel.close();
    let _ = channel.wait_close();
    let exit_status = channel.exit_status().unwrap_or(0);

    let mut output = decode_device_output(&stdout);
    if truncated {
        output.push_str("\n[output truncated]\n");
    }
    if output.trim().is_empty() && exit_status != 0 {
        let detail = decode_device_output(&stderr);
        return Err(ServiceError::execution(format!(
            "{} failed with exit status {}: {}",
            context,
            exit_status,
            detail.trim()
        )));
    }
    if let Some(line) = device_rejection(&output) {
        return Err(ServiceError::execution(format!(
            "Device rejected {}: {}",
            context.to_lowercase(),
            line
        )));
    }
    Ok(output)
}

/// The first CLI error line the device printed, if any.
fn device_rejection(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .find(|line| REJECTION_MARKERS.iter().any(|marker| line.starts_with(marker)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceErrorKind;

    #[test]
    fn device_rejection_finds_cli_errors() {
        let output = "show vesion\n         ^\n% Invalid input detected at '^' marker.\n";
        assert_eq!(
            device_rejection(output),
            Some("% Invalid input detected at '^' marker.")
        );
        assert_eq!(device_rejection("Cisco IOS Software, Version 15.2\n"), None);
    }

    #[test]
    fn timeout_ms_is_clamped() {
        assert_eq!(timeout_ms(Duration::from_millis(0)), 1);
        assert_eq!(timeout_ms(Duration::from_secs(30)), 30_000);
        assert_eq!(timeout_ms(Duration::from_secs(u64::MAX / 1000)), u32::MAX);
    }

    #[test]
    fn io_timeouts_map_to_timeout_kind() {
        let err = map_io_error(
            std::io::Error::new(ErrorKind::TimedOut, "slow"),
            ServiceError::connection,
            "Device r1:22",
        );
        assert_eq!(err.kind, ServiceErrorKind::Timeout);
        let err = map_io_error(
            std::io::Error::new(ErrorKind::ConnectionRefused, "refused"),
            ServiceError::connection,
            "Device r1:22",
        );
        assert_eq!(err.kind, ServiceErrorKind::Connection);
        assert!(err.message.starts_with("Device r1:22"));
    }

    #[test]
    fn refused_port_is_connection_error() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);
        let err = connect_tcp("127.0.0.1", port, Duration::from_secs(2)).expect_err("refused");
        assert!(matches!(
            err.kind,
            ServiceErrorKind::Connection | ServiceErrorKind::Timeout
        ));
    }

    #[tokio::test]
    async fn detached_teardown_leaves_the_async_worker() {
        let caller = std::thread::current().id();
        let (tx, rx) = tokio::sync::oneshot::channel();
        run_detached(move || {
            std::thread::sleep(Duration::from_millis(200));
            let _ = tx.send(std::thread::current().id());
        });
        let worker = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("teardown ran")
            .expect("thread id");
        assert_ne!(worker, caller);
    }

    #[test]
    fn detached_teardown_runs_without_a_runtime() {
        let (tx, rx) = std::sync::mpsc::channel();
        run_detached(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(5)).expect("teardown ran");
    }

    #[test]
    fn dropping_an_unconnected_session_does_not_block() {
        let session = SshDeviceSession {
            hostname: "r1".to_string(),
            session: Some(Session::new().expect("session")),
            enable_password: None,
            secrets: Vec::new(),
            logger: Logger::with_level("test", crate::services::logger::LogLevel::Error),
        };
        let started = Instant::now();
        drop(session);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn ceiling_reports_timeout_for_stuck_task() {
        let handle = tokio::task::spawn_blocking(|| {
            std::thread::sleep(Duration::from_millis(TIMEOUT_HARD_GRACE_MS + 1_500));
            Ok::<_, ServiceError>(())
        });
        let err = join_with_ceiling(handle, Duration::from_millis(100), "Bastion check")
            .await
            .expect_err("ceiling");
        assert_eq!(err.kind, ServiceErrorKind::Timeout);
        assert!(err.message.starts_with("Bastion check timed out"));
    }
}
