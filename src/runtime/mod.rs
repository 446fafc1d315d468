pub mod health;
pub mod ownership;
pub mod state_paths;

pub use health::{load_socket_health, save_socket_health, SocketHealth};
pub use ownership::{
    claim_ownership, is_process_alive, ownership_state, read_pid, release_ownership,
    signal_stop, spawn_stop_watcher, stop_requested, OwnershipState,
};
pub use state_paths::{
    bootstrap_state_root, default_state_root_path, StatePaths, DEFAULT_STATE_ROOT_DIR,
    STATE_ROOT_ENV,
};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to create runtime path {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to resolve home directory for runtime state root")]
    HomeDirectoryUnavailable,
    #[error("failed to read runtime state {path}: {source}")]
    ReadState {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode runtime state {path}: {source}")]
    EncodeState {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write runtime state {path}: {source}")]
    WriteState {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("bridge is already running with pid {pid}")]
    AlreadyRunning { pid: u32 },
    #[error("no running bridge instance")]
    NotRunning,
}
