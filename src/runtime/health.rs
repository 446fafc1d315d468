use super::{RuntimeError, StatePaths};
use crate::shared::fs_atomic::atomic_write_file;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketHealth {
    pub connected: bool,
    #[serde(default)]
    pub last_envelope_at: Option<i64>,
    #[serde(default)]
    pub last_reconnect: Option<i64>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub envelopes_acknowledged: u64,
}

pub fn load_socket_health(paths: &StatePaths) -> SocketHealth {
    let Ok(raw) = fs::read_to_string(paths.socket_health_path()) else {
        return SocketHealth::default();
    };
    serde_json::from_str(&raw).unwrap_or_default()
}

pub fn save_socket_health(paths: &StatePaths, health: &SocketHealth) -> Result<(), RuntimeError> {
    let path = paths.socket_health_path();
    let body = serde_json::to_vec_pretty(health).map_err(|source| RuntimeError::EncodeState {
        path: path.display().to_string(),
        source,
    })?;
    atomic_write_file(&path, &body).map_err(|source| RuntimeError::WriteState {
        path: path.display().to_string(),
        source,
    })
}
