pub mod approval;
pub mod blocks;
pub mod claims;
pub mod codec;
pub mod configuration;
pub mod home;

pub use approval::{ApprovalFlow, ApprovalPhase, Decision, DecisionOutcome, RequestOutcome};
pub use blocks::{Block, Button, ChatMessage, HomeView, ModalView};
pub use claims::RunClaims;
pub use configuration::{ConfigurationFlow, ConfigurationOutcome};

use crate::gateway::GatewayError;
use crate::store::StoreError;

/// Failures of flows that touch both Slack and the access store.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
