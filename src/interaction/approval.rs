//! Action approval protocol.
//!
//! One inbound request produces one Slack message that evolves in place:
//! Proposed -> (Cancelled | Loading -> (Succeeded | Failed)). The only state
//! carried between steps is the action definition encoded into the proposal
//! buttons.

use super::blocks::{Block, Button, ChatMessage};
use super::claims::{claim_key, ClaimRefusal, RunClaims};
use super::codec::{self, escape_newlines, extract_input_values, format_output, CodecError};
use super::home::configuration_required_message;
use crate::events::{ApprovalInteraction, UserMessage};
use crate::gateway::{ConversationGateway, GatewayError};
use crate::runner::{ActionDefinition, ActionRunner, InputValues, RunnerAccess, RunnerError};
use crate::shared::BridgeLog;
use std::collections::BTreeMap;

pub const RUN_ACTION_ID: &str = "run_action";
pub const CANCEL_ACTION_ID: &str = "cancel_action";

const NOT_IDENTIFIED_MESSAGE: &str =
    "I'm sorry, I could not identify the action you want to run. Please be more specific and try again.";
const NOT_CONFIGURED_AT_RUN_MESSAGE: &str =
    "The runner is not configured for this workspace. Connect the app to a runner and try again.";
const RESULT_NOT_SHOWN_MESSAGE: &str = "The action finished, but its result could not be displayed";

/// Slack rejects section text longer than this.
pub const SECTION_TEXT_LIMIT: usize = 3000;
const TRUNCATED_MARKER: &str = "\n…(truncated)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPhase {
    Proposed,
    Loading,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Run,
    Cancel,
}

impl Decision {
    pub fn from_action_id(action_id: &str) -> Option<Self> {
        match action_id {
            RUN_ACTION_ID => Some(Self::Run),
            CANCEL_ACTION_ID => Some(Self::Cancel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalEvent {
    Decided(Decision),
    Executed { succeeded: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalEffect {
    None,
    Execute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalStep {
    pub phase: ApprovalPhase,
    pub effect: ApprovalEffect,
}

impl ApprovalPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Transition table. `None` means the event does not apply in this
    /// phase and is dropped.
    pub fn next(self, event: ApprovalEvent) -> Option<ApprovalStep> {
        let (phase, effect) = match (self, event) {
            (Self::Proposed, ApprovalEvent::Decided(Decision::Cancel)) => {
                (Self::Cancelled, ApprovalEffect::None)
            }
            (Self::Proposed, ApprovalEvent::Decided(Decision::Run)) => {
                (Self::Loading, ApprovalEffect::Execute)
            }
            (Self::Loading, ApprovalEvent::Executed { succeeded: true }) => {
                (Self::Succeeded, ApprovalEffect::None)
            }
            (Self::Loading, ApprovalEvent::Executed { succeeded: false }) => {
                (Self::Failed, ApprovalEffect::None)
            }
            _ => return None,
        };
        Some(ApprovalStep { phase, effect })
    }
}

/// What a single approval message shows. Every stage after `Proposed`
/// renders the inputs read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalStage {
    Proposed,
    Loading,
    Succeeded(BTreeMap<String, String>),
    Failed(String),
    Cancelled,
}

impl ApprovalStage {
    pub fn phase(&self) -> ApprovalPhase {
        match self {
            Self::Proposed => ApprovalPhase::Proposed,
            Self::Loading => ApprovalPhase::Loading,
            Self::Succeeded(_) => ApprovalPhase::Succeeded,
            Self::Failed(_) => ApprovalPhase::Failed,
            Self::Cancelled => ApprovalPhase::Cancelled,
        }
    }

    fn status_text(&self) -> String {
        match self {
            Self::Proposed => String::new(),
            Self::Loading => "🔵 The action is running...".to_string(),
            Self::Cancelled => "⚪ The action was cancelled without running.".to_string(),
            Self::Succeeded(output) if output.is_empty() => {
                "🟢 The action was successfully run.".to_string()
            }
            Self::Succeeded(output) => fenced(
                "🟢 The action was successfully run with the following raw output: \n\n ",
                &format_output(output),
            ),
            Self::Failed(message) => {
                fenced("🔴 Error happened while running the action: \n\n ", message)
            }
        }
    }

    fn fallback_text(&self, action: &ActionDefinition) -> String {
        match self {
            Self::Proposed => format!("Proposed action: {}", action.title),
            Self::Loading => format!("Running {}...", action.title),
            Self::Succeeded(_) => format!("{} finished successfully", action.title),
            Self::Failed(_) => format!("{} failed", action.title),
            Self::Cancelled => format!("{} was cancelled", action.title),
        }
    }
}

/// Cuts `text` to at most `limit` characters, marking the cut.
pub fn truncate_text(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let keep = limit.saturating_sub(TRUNCATED_MARKER.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATED_MARKER);
    out
}

fn fenced(intro: &str, body: &str) -> String {
    let budget = SECTION_TEXT_LIMIT.saturating_sub(intro.chars().count() + 6);
    format!("{intro}```{}```", truncate_text(body, budget))
}

fn summary_blocks(action: &ActionDefinition) -> Vec<Block> {
    let intro = if action.has_input_parameters() {
        "Based on your request, I found the following action and prefilled input parameters:"
    } else {
        "Based on your request, I found the following action:"
    };
    vec![
        Block::text(intro),
        Block::Divider,
        Block::text(format!("⚡ *{}* \n{}", action.title, action.description)),
        Block::Divider,
    ]
}

/// Proposal render: editable inputs pre-filled from the runner's
/// suggestion, plus run/cancel buttons carrying the encoded action.
fn proposal_blocks(
    action: &ActionDefinition,
    suggested: &InputValues,
) -> Result<Vec<Block>, CodecError> {
    let token = codec::encode(action)?;
    let mut blocks = summary_blocks(action);

    if action.has_input_parameters() {
        for parameter in &action.input_parameters {
            let label = if parameter.is_required() {
                format!("{} (required)", parameter.title)
            } else {
                parameter.title.clone()
            };
            blocks.push(Block::Input {
                block_id: parameter.key.clone(),
                label,
                hint: Some(parameter.description.clone()).filter(|d| !d.trim().is_empty()),
                initial_value: suggested
                    .get(&parameter.key)
                    .map(|value| escape_newlines(value)),
            });
        }
    } else {
        blocks.push(Block::text(
            "This action does not have any input parameters.",
        ));
    }

    let run_label = if action.has_input_parameters() {
        "Run action with parameters"
    } else {
        "Run action"
    };
    blocks.push(Block::Divider);
    blocks.push(Block::Actions {
        elements: vec![
            Button::new(RUN_ACTION_ID, run_label)
                .primary()
                .with_value(token.clone()),
            Button::new(CANCEL_ACTION_ID, "Cancel").with_value(token),
        ],
    });
    Ok(blocks)
}

pub fn render_approval(
    action: &ActionDefinition,
    input: &InputValues,
    stage: &ApprovalStage,
) -> Result<Vec<Block>, CodecError> {
    match stage {
        ApprovalStage::Proposed => proposal_blocks(action, input),
        _ => Ok(stage_blocks(action, input, stage)),
    }
}

pub fn approval_message(
    action: &ActionDefinition,
    input: &InputValues,
    stage: &ApprovalStage,
) -> Result<ChatMessage, CodecError> {
    Ok(ChatMessage::with_blocks(
        stage.fallback_text(action),
        render_approval(action, input, stage)?,
    ))
}

fn stage_blocks(action: &ActionDefinition, input: &InputValues, stage: &ApprovalStage) -> Vec<Block> {
    let mut blocks = summary_blocks(action);
    if action.has_input_parameters() {
        for parameter in &action.input_parameters {
            let value = input.get(&parameter.key).map(String::as_str).unwrap_or("");
            blocks.push(Block::text(truncate_text(
                &format!("*{}*: {value}", parameter.title),
                SECTION_TEXT_LIMIT,
            )));
        }
    } else {
        blocks.push(Block::text(
            "This action does not have any input parameters.",
        ));
    }
    blocks.push(Block::Divider);
    blocks.push(Block::text(stage.status_text()));
    blocks
}

pub fn error_message(message: &str) -> ChatMessage {
    ChatMessage::with_blocks(
        format!("🔴 Error: {message}"),
        vec![Block::text(fenced("🔴 Error: \n\n ", message))],
    )
}

/// Drops the first well-formed `<@USER>` mention (non-empty, no whitespace)
/// and surrounding whitespace.
pub fn request_text(raw: &str) -> String {
    for (start, _) in raw.match_indices("<@") {
        let rest = &raw[start + 2..];
        let Some(end) = rest.find(|c: char| c == '>' || c.is_whitespace()) else {
            break;
        };
        if end > 0 && rest[end..].starts_with('>') {
            let mut text = String::with_capacity(raw.len());
            text.push_str(&raw[..start]);
            text.push_str(&rest[end + 1..]);
            return text.trim().to_string();
        }
    }
    raw.trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    NotConfigured,
    NotIdentified,
    Proposed { action_id: String },
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    UndecodableState,
    /// Another decision on the same message is still being carried out.
    RunInFlight,
    /// The message was already run or cancelled.
    AlreadyDecided,
    /// The decision has no transition out of `Proposed`.
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    Ignored(IgnoreReason),
    Finished(ApprovalPhase),
}

/// Drives the approval protocol for one workspace gateway.
pub struct ApprovalFlow<'a> {
    runner: &'a dyn ActionRunner,
    gateway: &'a dyn ConversationGateway,
    claims: &'a RunClaims,
    log: &'a BridgeLog,
}

impl<'a> ApprovalFlow<'a> {
    pub fn new(
        runner: &'a dyn ActionRunner,
        gateway: &'a dyn ConversationGateway,
        claims: &'a RunClaims,
        log: &'a BridgeLog,
    ) -> Self {
        Self {
            runner,
            gateway,
            claims,
            log,
        }
    }

    fn reply(&self, request: &UserMessage, message: &ChatMessage) -> Result<String, GatewayError> {
        self.gateway
            .post_message(&request.channel_id, request.thread_ts.as_deref(), message)
    }

    fn reply_with_error(
        &self,
        request: &UserMessage,
        message: String,
    ) -> Result<RequestOutcome, GatewayError> {
        self.log.warn(
            "approval.request.failed",
            &format!("team {} channel {}: {message}", request.team_id, request.channel_id),
        );
        self.reply(request, &error_message(&message))?;
        Ok(RequestOutcome::Failed { message })
    }

    /// Start -> Proposed, or one of the single-reply dead ends.
    pub fn handle_request(
        &self,
        access: Option<&RunnerAccess>,
        request: &UserMessage,
    ) -> Result<RequestOutcome, GatewayError> {
        let Some(access) = access.filter(|access| access.is_complete()) else {
            self.reply(request, &configuration_required_message())?;
            self.log.info(
                "approval.request.not_configured",
                &format!("team {}", request.team_id),
            );
            return Ok(RequestOutcome::NotConfigured);
        };

        let text = request_text(&request.text);
        let identified = match self.runner.identify(access, &text) {
            Ok(outcome) => outcome,
            Err(err) => return self.reply_with_error(request, err.display_message()),
        };

        let action_id = match identified.action_id.as_deref() {
            Some(id) if identified.identified && !id.trim().is_empty() => id,
            _ => {
                self.reply(request, &ChatMessage::plain(NOT_IDENTIFIED_MESSAGE))?;
                self.log.info(
                    "approval.request.not_identified",
                    &format!("team {} channel {}", request.team_id, request.channel_id),
                );
                return Ok(RequestOutcome::NotIdentified);
            }
        };

        let action = match self.runner.fetch_action(access, action_id) {
            Ok(action) => action,
            Err(err) => return self.reply_with_error(request, err.display_message()),
        };

        let proposal = match approval_message(&action, &identified.input, &ApprovalStage::Proposed) {
            Ok(message) => message,
            Err(err) => return self.reply_with_error(request, err.to_string()),
        };
        let ts = self.reply(request, &proposal)?;
        self.log.info(
            "approval.proposed",
            &format!(
                "team {} channel {} message {ts} action {}",
                request.team_id, request.channel_id, action.id
            ),
        );
        Ok(RequestOutcome::Proposed {
            action_id: action.id,
        })
    }

    /// Proposed -> Cancelled, or Proposed -> Loading -> Succeeded | Failed.
    pub fn handle_decision(
        &self,
        access: Option<&RunnerAccess>,
        interaction: &ApprovalInteraction,
    ) -> Result<DecisionOutcome, GatewayError> {
        let action = match codec::decode(&interaction.state_token) {
            Ok(action) => action,
            Err(err) => {
                self.log.debug(
                    "approval.decision.undecodable",
                    &format!(
                        "channel {} message {}: {err}",
                        interaction.channel_id, interaction.message_ts
                    ),
                );
                return Ok(DecisionOutcome::Ignored(IgnoreReason::UndecodableState));
            }
        };
        let input = extract_input_values(&interaction.form, &action.input_parameters);

        let Some(step) = ApprovalPhase::Proposed.next(ApprovalEvent::Decided(interaction.decision))
        else {
            return Ok(DecisionOutcome::Ignored(IgnoreReason::NotApplicable));
        };

        let key = claim_key(interaction.channel_id.as_str(), &interaction.message_ts);
        let claim = match self.claims.try_claim(key) {
            Ok(claim) => claim,
            Err(refusal) => {
                let reason = match refusal {
                    ClaimRefusal::InFlight => IgnoreReason::RunInFlight,
                    ClaimRefusal::Settled => IgnoreReason::AlreadyDecided,
                };
                self.log.info(
                    "approval.decision.refused",
                    &format!(
                        "channel {} message {}: {reason:?}",
                        interaction.channel_id, interaction.message_ts
                    ),
                );
                return Ok(DecisionOutcome::Ignored(reason));
            }
        };

        if step.effect == ApprovalEffect::None {
            if let Err(err) = self.update(interaction, &action, &input, &ApprovalStage::Cancelled) {
                claim.abandon();
                return Err(err);
            }
            self.log.info(
                "approval.cancelled",
                &format!(
                    "channel {} message {} action {}",
                    interaction.channel_id, interaction.message_ts, action.id
                ),
            );
            return Ok(DecisionOutcome::Finished(step.phase));
        }

        if let Err(err) = self.update(interaction, &action, &input, &ApprovalStage::Loading) {
            claim.abandon();
            return Err(err);
        }

        let result = match access.filter(|access| access.is_complete()) {
            Some(access) => self.runner.execute(access, &action.id, &input),
            None => Err(RunnerError::Upstream {
                status: None,
                message: NOT_CONFIGURED_AT_RUN_MESSAGE.to_string(),
            }),
        };

        let event = ApprovalEvent::Executed {
            succeeded: result.is_ok(),
        };
        let phase = step
            .phase
            .next(event)
            .map(|step| step.phase)
            .unwrap_or(ApprovalPhase::Failed);
        let stage = match result {
            Ok(output) => ApprovalStage::Succeeded(output.output),
            Err(err) => ApprovalStage::Failed(err.display_message()),
        };
        let phase = self.finish_run(interaction, &action, &input, &stage, phase)?;
        self.log.info(
            "approval.run.finished",
            &format!(
                "channel {} message {} action {} phase {phase:?}",
                interaction.channel_id, interaction.message_ts, action.id
            ),
        );
        Ok(DecisionOutcome::Finished(phase))
    }

    /// Renders the terminal stage. When Slack refuses it, tries one bare
    /// Failed render instead.
    fn finish_run(
        &self,
        interaction: &ApprovalInteraction,
        action: &ActionDefinition,
        input: &InputValues,
        stage: &ApprovalStage,
        phase: ApprovalPhase,
    ) -> Result<ApprovalPhase, GatewayError> {
        let Err(err) = self.update(interaction, action, input, stage) else {
            return Ok(phase);
        };
        self.log.warn(
            "approval.render.failed",
            &format!(
                "channel {} message {} phase {phase:?}: {err}",
                interaction.channel_id, interaction.message_ts
            ),
        );
        let fallback = ApprovalStage::Failed(format!("{RESULT_NOT_SHOWN_MESSAGE}: {err}"));
        let message = ChatMessage::with_blocks(
            fallback.fallback_text(action),
            vec![Block::text(fallback.status_text())],
        );
        match self
            .gateway
            .update_message(&interaction.channel_id, &interaction.message_ts, &message)
        {
            Ok(()) => Ok(ApprovalPhase::Failed),
            Err(_) => Err(err),
        }
    }

    fn update(
        &self,
        interaction: &ApprovalInteraction,
        action: &ActionDefinition,
        input: &InputValues,
        stage: &ApprovalStage,
    ) -> Result<(), GatewayError> {
        let message = ChatMessage::with_blocks(
            stage.fallback_text(action),
            stage_blocks(action, input, stage),
        );
        self.gateway
            .update_message(&interaction.channel_id, &interaction.message_ts, &message)
    }
}
