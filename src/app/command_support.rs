use crate::config::{load_settings as config_load_settings, Settings};
use crate::runtime::{bootstrap_state_root, default_state_root_path, StatePaths};
use crate::shared::{BridgeLog, TeamId};
use crate::store::SqliteStore;

pub const SLACK_APP_TOKEN_ENV: &str = "SLACK_APP_TOKEN";
pub const SLACK_BOT_TOKEN_ENV: &str = "SLACK_BOT_TOKEN";
pub const RUNNER_API_KEY_ENV: &str = "ACTIONBRIDGE_RUNNER_API_KEY";

pub fn ensure_runtime_root() -> Result<StatePaths, String> {
    let root = default_state_root_path().map_err(|e| e.to_string())?;
    let paths = StatePaths::new(root);
    bootstrap_state_root(&paths).map_err(|e| e.to_string())?;
    Ok(paths)
}

pub fn load_settings(paths: &StatePaths) -> Result<Settings, String> {
    config_load_settings(paths).map_err(|e| e.to_string())
}

pub fn bridge_log(paths: &StatePaths, settings: &Settings) -> BridgeLog {
    BridgeLog::new(paths.log_path(), settings.logging.level)
}

pub fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn open_store(paths: &StatePaths) -> Result<SqliteStore, String> {
    SqliteStore::open(&paths.database_path())
        .map(|store| store.with_fallback_bot_token(optional_env(SLACK_BOT_TOKEN_ENV)))
        .map_err(|e| e.to_string())
}

pub fn parse_team_id(raw: Option<&String>, usage: &str) -> Result<TeamId, String> {
    let raw = raw.ok_or_else(|| format!("usage: {usage}"))?;
    TeamId::parse(raw)
}
