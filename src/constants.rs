pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const DEFAULT_API_HOST: &str = "0.0.0.0";
    pub const DEFAULT_API_PORT: u16 = 8000;
    pub const DEFAULT_MCP_HOST: &str = "0.0.0.0";
    pub const DEFAULT_MCP_PORT: u16 = 3000;
    pub const SSE_KEEPALIVE_SECS: u64 = 15;
    pub const SSE_SESSION_QUEUE: usize = 64;
    pub const TIMEOUT_JUMPHOST_CONNECT_MS: u64 = 10_000;
    pub const TIMEOUT_HARD_GRACE_MS: u64 = 2_000;
    pub const KEEPALIVE_INTERVAL_SECS: u32 = 30;
    pub const TUNNEL_IDLE_SLEEP_MS: u64 = 2;
    pub const TUNNEL_BUFFER_BYTES: usize = 16 * 1024;
}

pub mod limits {
    pub const MIN_PORT: u16 = 1;
    pub const MAX_PORT: u16 = 65_535;
    pub const MAX_HOSTNAME_LENGTH: usize = 255;
    pub const MAX_USERNAME_LENGTH: usize = 255;
    pub const MAX_PASSWORD_LENGTH: usize = 1024;
    pub const MAX_KEY_PATH_LENGTH: usize = 4096;
    pub const MAX_COMMAND_LENGTH: usize = 1000;
    pub const MAX_PIPE_VALUE_LENGTH: usize = 500;
    pub const MAX_DEVICES_PER_REQUEST: usize = 100;
    pub const MAX_COMMANDS_PER_REQUEST: usize = 50;
    pub const MIN_TIMEOUT_SECONDS: u64 = 1;
    pub const MAX_TIMEOUT_SECONDS: u64 = 600;
    pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_CAPTURE_BYTES: usize = 4 * 1024 * 1024;
}

pub mod execution {
    pub const DEFAULT_MAX_PARALLEL_DEVICES: usize = 4;
    pub const MAX_PARALLEL_DEVICES: usize = 64;
}

pub mod commands {
    pub const READ_ONLY_VERB: &str = "show";
    pub const SUPPORTED_OS_FAMILIES: &[&str] = &["ios", "iosxe", "iosxr", "nxos", "asa"];
}
