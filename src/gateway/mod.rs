//! Conversation gateway: everything that talks to Slack.
//!
//! `events` parses Socket Mode envelopes into [`crate::events`] values,
//! `socket` runs the Socket Mode loop, `api` is the Web API client and
//! `slack` adapts it to [`ConversationGateway`].

use crate::interaction::blocks::{ChatMessage, HomeView, ModalView};
use crate::shared::{ChannelId, TeamId, UserId};
use std::sync::Arc;

pub mod api;
pub mod events;
pub mod slack;
pub mod socket;

pub use api::SlackApiClient;
pub use slack::{SlackGateway, SlackGatewayProvider};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("slack api request failed: {0}")]
    ApiRequest(String),
    #[error("slack api responded with error `{0}`")]
    ApiResponse(String),
    #[error("slack rate limited `{method}`; retry after {retry_after_secs}s")]
    RateLimited {
        method: String,
        retry_after_secs: u64,
    },
    #[error("no installation found for team `{0}`")]
    NotInstalled(String),
    #[error("installation lookup failed: {0}")]
    Installation(String),
}

/// Chat surface operations the bridge performs for one workspace.
pub trait ConversationGateway: Send + Sync {
    /// Posts a new message and returns its `ts`.
    fn post_message(
        &self,
        channel_id: &ChannelId,
        thread_ts: Option<&str>,
        message: &ChatMessage,
    ) -> Result<String, GatewayError>;

    /// Replaces an existing message in place.
    fn update_message(
        &self,
        channel_id: &ChannelId,
        ts: &str,
        message: &ChatMessage,
    ) -> Result<(), GatewayError>;

    fn open_modal(&self, trigger_id: &str, view: &ModalView) -> Result<(), GatewayError>;

    fn update_modal(&self, view_id: &str, view: &ModalView) -> Result<(), GatewayError>;

    fn publish_home_view(&self, user_id: &UserId, view: &HomeView) -> Result<(), GatewayError>;
}

/// Resolves the gateway for a workspace, authorizing with its bot token.
pub trait GatewayProvider: Send + Sync {
    fn gateway_for(&self, team_id: &TeamId) -> Result<Arc<dyn ConversationGateway>, GatewayError>;
}
