use super::RuntimeError;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_STATE_ROOT_DIR: &str = ".actionbridge";
pub const STATE_ROOT_ENV: &str = "ACTIONBRIDGE_HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
}

impl StatePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn required_directories(&self) -> Vec<PathBuf> {
        vec![
            self.root.join("logs"),
            self.root.join("db"),
            self.root.join("daemon"),
            self.root.join("runtime"),
        ]
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("db/bridge.sqlite3")
    }

    pub fn daemon_dir(&self) -> PathBuf {
        self.root.join("daemon")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.daemon_dir().join("bridge.pid")
    }

    pub fn stop_signal_path(&self) -> PathBuf {
        self.daemon_dir().join("stop")
    }

    pub fn socket_health_path(&self) -> PathBuf {
        self.root.join("runtime/socket.health.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("logs/bridge.log")
    }
}

pub fn default_state_root_path() -> Result<PathBuf, RuntimeError> {
    if let Some(root) = std::env::var_os(STATE_ROOT_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(root));
    }
    let home = std::env::var_os("HOME").ok_or(RuntimeError::HomeDirectoryUnavailable)?;
    Ok(PathBuf::from(home).join(DEFAULT_STATE_ROOT_DIR))
}

pub fn bootstrap_state_root(paths: &StatePaths) -> Result<(), RuntimeError> {
    for path in paths.required_directories() {
        fs::create_dir_all(&path).map_err(|source| RuntimeError::CreateDir {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(())
}
