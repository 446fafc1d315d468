pub mod error;
pub mod load;
pub mod settings;

pub use error::ConfigError;
pub use load::{load_settings, required_env, save_settings};
pub use settings::{
    LoggingSettings, RunnerSettings, Settings, SlackSettings, DEFAULT_SLACK_API_BASE,
    SLACK_API_BASE_ENV,
};
