use super::{ConfigError, Settings};
use crate::runtime::StatePaths;
use std::fs;
use std::path::PathBuf;

/// Loads `<state_root>/config.yaml`, falling back to defaults when the file
/// has not been written yet.
pub fn load_settings(paths: &StatePaths) -> Result<Settings, ConfigError> {
    let path = paths.settings_file();
    let settings = if path.exists() {
        Settings::from_path(&path)?
    } else {
        Settings::default()
    };
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(paths: &StatePaths, settings: &Settings) -> Result<PathBuf, ConfigError> {
    settings.validate()?;
    let path = paths.settings_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.display().to_string(),
            source,
        })?;
    }
    let body = serde_yaml::to_string(settings).map_err(|source| ConfigError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(&path, body).map_err(|source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}

pub fn required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}
