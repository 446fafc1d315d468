pub mod access;
pub mod client;
pub mod types;

pub use access::{mask_secret, RunnerAccess};
pub use client::{ActionRunner, RunnerClient};
pub use types::{
    ActionDefinition, ActionParameter, ExecutionOutput, IdentifyOutcome, InputValues,
    ParameterValidation, PluginDetail, PluginSummary,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunnerError {
    #[error("runner request failed: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },
    #[error("action `{action_id}` was not found on the runner")]
    NotFound { action_id: String },
    #[error("runner is unreachable: {0}")]
    Transport(String),
}

impl RunnerError {
    pub(crate) fn malformed(detail: String) -> Self {
        Self::Upstream {
            status: None,
            message: format!("malformed runner response: {detail}"),
        }
    }

    /// Text shown to chat users. Upstream messages are surfaced verbatim.
    pub fn display_message(&self) -> String {
        match self {
            Self::Upstream { message, .. } => message.clone(),
            Self::NotFound { .. } => self.to_string(),
            Self::Transport(message) => message.clone(),
        }
    }
}
