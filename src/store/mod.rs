//! Per-workspace persistence: runner access and Slack bot tokens.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::runner::RunnerAccess;
use crate::shared::TeamId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to create database parent {path}: {source}")]
    CreateParent {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("workspace {team_id} is not installed and no fallback bot token is set")]
    NotInstalled { team_id: String },
}

/// Runner access per workspace. `store` replaces any previous value.
pub trait AccessStore: Send + Sync {
    fn fetch(&self, team_id: &TeamId) -> Result<Option<RunnerAccess>, StoreError>;
    fn store(&self, team_id: &TeamId, access: &RunnerAccess) -> Result<(), StoreError>;
}

/// Bot token lookup for a workspace.
pub trait InstallationStore: Send + Sync {
    fn authorize(&self, team_id: &TeamId) -> Result<String, StoreError>;
    fn store_installation(&self, team_id: &TeamId, bot_token: &str) -> Result<(), StoreError>;
}
