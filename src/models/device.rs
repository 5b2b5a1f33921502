use serde::Serialize;
use std::fmt;

/// Device families whose CLI accepts the `| include/exclude/begin/section`
/// filter syntax this service builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceOs {
    Ios,
    Iosxe,
    Iosxr,
    Nxos,
    Asa,
}

impl DeviceOs {
    pub const ALL: [DeviceOs; 5] = [
        DeviceOs::Ios,
        DeviceOs::Iosxe,
        DeviceOs::Iosxr,
        DeviceOs::Nxos,
        DeviceOs::Asa,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceOs::Ios => "ios",
            DeviceOs::Iosxe => "iosxe",
            DeviceOs::Iosxr => "iosxr",
            DeviceOs::Nxos => "nxos",
            DeviceOs::Asa => "asa",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            DeviceOs::Ios => "Cisco IOS",
            DeviceOs::Iosxe => "Cisco IOS-XE",
            DeviceOs::Iosxr => "Cisco IOS-XR",
            DeviceOs::Nxos => "Cisco NX-OS",
            DeviceOs::Asa => "Cisco ASA",
        }
    }

    pub fn from_name(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        DeviceOs::ALL
            .into_iter()
            .find(|os| os.as_str() == normalized)
    }
}

impl fmt::Display for DeviceOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache identity of a proxy connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JumphostKey {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl fmt::Display for JumphostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JumphostConfig {
    host: String,
    port: u16,
    username: String,
    key_path: String,
}

impl JumphostConfig {
    pub(crate) fn new(host: String, port: u16, username: String, key_path: String) -> Self {
        Self {
            host,
            port,
            username,
            key_path,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    pub fn key(&self) -> JumphostKey {
        JumphostKey {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DeviceCredential {
    hostname: String,
    port: u16,
    username: String,
    password: String,
    os_family: DeviceOs,
    enable_password: Option<String>,
    jumphost: Option<JumphostConfig>,
}

impl DeviceCredential {
    pub(crate) fn new(
        hostname: String,
        port: u16,
        username: String,
        password: String,
        os_family: DeviceOs,
        enable_password: Option<String>,
        jumphost: Option<JumphostConfig>,
    ) -> Self {
        Self {
            hostname,
            port,
            username,
            password,
            os_family,
            enable_password,
            jumphost,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn os_family(&self) -> DeviceOs {
        self.os_family
    }

    pub fn enable_password(&self) -> Option<&str> {
        self.enable_password.as_deref()
    }

    pub fn jumphost(&self) -> Option<&JumphostConfig> {
        self.jumphost.as_ref()
    }

    /// Secrets that must never appear verbatim in logs or error messages.
    pub fn secrets(&self) -> Vec<String> {
        let mut out = vec![self.password.clone()];
        if let Some(enable) = &self.enable_password {
            out.push(enable.clone());
        }
        out
    }
}

impl fmt::Debug for DeviceCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceCredential")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("os_family", &self.os_family)
            .field(
                "enable_password",
                &self.enable_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("jumphost", &self.jumphost)
            .finish()
    }
}
