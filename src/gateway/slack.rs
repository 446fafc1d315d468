use super::api::SlackApiClient;
use super::{ConversationGateway, GatewayError, GatewayProvider};
use crate::interaction::blocks::{ChatMessage, HomeView, ModalView};
use crate::shared::{ChannelId, TeamId, UserId};
use crate::store::{InstallationStore, StoreError};
use std::sync::Arc;

/// [`ConversationGateway`] over the Slack Web API for one workspace.
pub struct SlackGateway {
    api: SlackApiClient,
}

impl SlackGateway {
    pub fn new(api: SlackApiClient) -> Self {
        Self { api }
    }
}

impl ConversationGateway for SlackGateway {
    fn post_message(
        &self,
        channel_id: &ChannelId,
        thread_ts: Option<&str>,
        message: &ChatMessage,
    ) -> Result<String, GatewayError> {
        self.api
            .post_message(channel_id.as_str(), thread_ts, message)
    }

    fn update_message(
        &self,
        channel_id: &ChannelId,
        ts: &str,
        message: &ChatMessage,
    ) -> Result<(), GatewayError> {
        self.api.update_message(channel_id.as_str(), ts, message)
    }

    fn open_modal(&self, trigger_id: &str, view: &ModalView) -> Result<(), GatewayError> {
        self.api.open_view(trigger_id, view)
    }

    fn update_modal(&self, view_id: &str, view: &ModalView) -> Result<(), GatewayError> {
        self.api.update_view(view_id, view)
    }

    fn publish_home_view(&self, user_id: &UserId, view: &HomeView) -> Result<(), GatewayError> {
        self.api.publish_view(user_id.as_str(), view)
    }
}

/// Builds a [`SlackGateway`] per event from the workspace's bot token.
pub struct SlackGatewayProvider {
    api_base: String,
    installations: Arc<dyn InstallationStore>,
}

impl SlackGatewayProvider {
    pub fn new(api_base: impl Into<String>, installations: Arc<dyn InstallationStore>) -> Self {
        Self {
            api_base: api_base.into(),
            installations,
        }
    }
}

impl GatewayProvider for SlackGatewayProvider {
    fn gateway_for(&self, team_id: &TeamId) -> Result<Arc<dyn ConversationGateway>, GatewayError> {
        let token = self
            .installations
            .authorize(team_id)
            .map_err(|err| match err {
                StoreError::NotInstalled { team_id } => GatewayError::NotInstalled(team_id),
                other => GatewayError::Installation(other.to_string()),
            })?;
        Ok(Arc::new(SlackGateway::new(SlackApiClient::new(
            self.api_base.clone(),
            token,
        ))))
    }
}
