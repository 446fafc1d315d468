use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Append-only JSON-lines log shared by the socket loop and handler threads.
///
/// Each line is one object with `timestamp`, `level`, `event` and `message`.
/// Write failures are dropped so logging never takes a handler down.
#[derive(Debug, Clone)]
pub struct BridgeLog {
    path: Option<PathBuf>,
    min_level: LogLevel,
}

impl BridgeLog {
    pub fn new(path: impl Into<PathBuf>, min_level: LogLevel) -> Self {
        Self {
            path: Some(path.into()),
            min_level,
        }
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            min_level: LogLevel::Error,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn debug(&self, event: &str, message: &str) {
        self.append(LogLevel::Debug, event, message);
    }

    pub fn info(&self, event: &str, message: &str) {
        self.append(LogLevel::Info, event, message);
    }

    pub fn warn(&self, event: &str, message: &str) {
        self.append(LogLevel::Warn, event, message);
    }

    pub fn error(&self, event: &str, message: &str) {
        self.append(LogLevel::Error, event, message);
    }

    pub fn append(&self, level: LogLevel, event: &str, message: &str) {
        let Some(path) = self.path.as_ref() else {
            return;
        };
        if level < self.min_level {
            return;
        }

        let payload = serde_json::json!({
            "timestamp": super::now_secs(),
            "level": level.as_str(),
            "event": event,
            "message": message,
        });
        let Ok(line) = serde_json::to_string(&payload) else {
            return;
        };

        if let Some(parent) = path.parent() {
            if fs::create_dir_all(parent).is_err() {
                return;
            }
        }
        let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(path) else {
            return;
        };
        let _ = writeln!(file, "{line}");
    }
}
