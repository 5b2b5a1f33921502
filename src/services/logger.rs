use crate::utils::redact::redact_object;
use std::sync::{Arc, Mutex};

const MAX_META_STRING: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" | "trace" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    fn from_env() -> Self {
        let raw = std::env::var("NETSHOW_LOG_LEVEL")
            .or_else(|_| std::env::var("LOG_LEVEL"))
            .unwrap_or_else(|_| "info".to_string());
        Self::parse(&raw)
    }

    fn rank(self) -> u8 {
        match self {
            LogLevel::Error => 0,
            LogLevel::Warn => 1,
            LogLevel::Info => 2,
            LogLevel::Debug => 3,
        }
    }

    fn allows(self, other: LogLevel) -> bool {
        other.rank() <= self.rank()
    }

    fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    error: u64,
    warn: u64,
    info: u64,
    debug: u64,
}

/// Structured stderr logger. Children share the level counters of their
/// parent and extend its context path (`netshow:execute:router`).
#[derive(Debug, Clone)]
pub struct Logger {
    context: String,
    level: LogLevel,
    counters: Arc<Mutex<Counters>>,
}

impl Logger {
    pub fn new(context: &str) -> Self {
        Self::with_level(context, LogLevel::from_env())
    }

    pub fn with_level(context: &str, level: LogLevel) -> Self {
        Self {
            context: context.to_string(),
            level,
            counters: Arc::new(Mutex::new(Counters::default())),
        }
    }

    pub fn child(&self, suffix: &str) -> Self {
        let context = if suffix.is_empty() {
            self.context.clone()
        } else {
            format!("{}:{}", self.context, suffix)
        };
        Self {
            context,
            level: self.level,
            counters: self.counters.clone(),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    fn log(&self, level: LogLevel, message: &str, meta: Option<&serde_json::Value>) {
        if !self.level.allows(level) {
            return;
        }
        if let Ok(mut counters) = self.counters.lock() {
            match level {
                LogLevel::Error => counters.error += 1,
                LogLevel::Warn => counters.warn += 1,
                LogLevel::Info => counters.info += 1,
                LogLevel::Debug => counters.debug += 1,
            }
        }
        let timestamp = chrono::Utc::now().to_rfc3339();
        // credentials travel through request metadata; never print them
        let meta_suffix = meta
            .filter(|m| !m.is_null())
            .map(|m| format!(" {}", redact_object(m, MAX_META_STRING, None)))
            .unwrap_or_default();
        eprintln!(
            "[{}] {} [{}] {}{}",
            timestamp,
            level.label(),
            self.context,
            message,
            meta_suffix
        );
    }

    pub fn error(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Error, message, meta);
    }

    pub fn warn(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Warn, message, meta);
    }

    pub fn info(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Info, message, meta);
    }

    pub fn debug(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Debug, message, meta);
    }

    pub fn stats(&self) -> serde_json::Value {
        let counters = self.counters.lock().unwrap_or_else(|err| err.into_inner());
        serde_json::json!({
            "level": self.level.label().to_lowercase(),
            "context": self.context,
            "error": counters.error,
            "warn": counters.warn,
            "info": counters.info,
            "debug": counters.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn children_share_counters_and_extend_context() {
        let root = Logger::with_level("netshow", LogLevel::Debug);
        let child = root.child("execute");
        assert_eq!(child.context(), "netshow:execute");
        child.warn("device unreachable", None);
        root.info("started", None);
        let stats = root.stats();
        assert_eq!(stats["warn"], 1);
        assert_eq!(stats["info"], 1);
    }

    #[test]
    fn suppressed_levels_are_not_counted() {
        let logger = Logger::with_level("netshow", LogLevel::Warn);
        logger.debug("noise", None);
        logger.info("noise", None);
        logger.error("boom", None);
        let stats = logger.stats();
        assert_eq!(stats["debug"], 0);
        assert_eq!(stats["info"], 0);
        assert_eq!(stats["error"], 1);
    }

    #[test]
    fn parse_accepts_common_aliases() {
        assert_eq!(LogLevel::parse("WARNING"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("trace"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("bogus"), LogLevel::Info);
    }
}
