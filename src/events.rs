//! Inbound events the bridge reacts to, after the gateway has parsed them
//! out of Slack envelopes.

use crate::interaction::approval::Decision;
use crate::interaction::codec::FormState;
use crate::shared::{ChannelId, TeamId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Message,
    HomeOpened,
    Interaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Message(UserMessage),
    HomeOpened(HomeOpened),
    Interaction(InteractionEvent),
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::HomeOpened(_) => EventKind::HomeOpened,
            Self::Interaction(_) => EventKind::Interaction,
        }
    }

    pub fn team_id(&self) -> Option<&TeamId> {
        match self {
            Self::Message(message) => Some(&message.team_id),
            Self::HomeOpened(opened) => Some(&opened.team_id),
            Self::Interaction(interaction) => interaction.team_id(),
        }
    }
}

/// A free-text request addressed to the bridge (DM or mention).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub team_id: TeamId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub text: String,
    pub ts: String,
    pub thread_ts: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeOpened {
    pub team_id: TeamId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionEvent {
    Approval(ApprovalInteraction),
    OpenConfiguration {
        team_id: TeamId,
        trigger_id: String,
    },
    SubmitConfiguration(ConfigurationSubmission),
    /// Anything else Slack sends on the interactivity channel. Dropped.
    Unrecognized {
        team_id: Option<TeamId>,
        description: String,
    },
}

impl InteractionEvent {
    pub fn team_id(&self) -> Option<&TeamId> {
        match self {
            Self::Approval(approval) => Some(&approval.team_id),
            Self::OpenConfiguration { team_id, .. } => Some(team_id),
            Self::SubmitConfiguration(submission) => Some(&submission.team_id),
            Self::Unrecognized { team_id, .. } => team_id.as_ref(),
        }
    }
}

/// A run/cancel click on a proposal message. `state_token` is the raw
/// button value; it is decoded by the approval flow, not the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalInteraction {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub message_ts: String,
    pub decision: Decision,
    pub state_token: String,
    pub form: FormState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationSubmission {
    pub team_id: TeamId,
    pub user_id: UserId,
    pub view_id: String,
    pub form: FormState,
}
