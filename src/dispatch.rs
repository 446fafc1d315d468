//! Routes inbound events to the approval, configuration and home flows.

use crate::events::{EventKind, HomeOpened, InboundEvent, InteractionEvent, UserMessage};
use crate::gateway::GatewayProvider;
use crate::interaction::approval::{ApprovalFlow, DecisionOutcome, RequestOutcome};
use crate::interaction::configuration::{verifying_modal, ConfigurationFlow};
use crate::interaction::home::publish_home;
use crate::interaction::{FlowError, ModalView, RunClaims};
use crate::runner::ActionRunner;
use crate::shared::{BridgeLog, TeamId};
use crate::store::AccessStore;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// What goes back to Slack in the envelope ack, before any handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    Empty,
    /// `response_action: update` for a view submission.
    UpdateView(ModalView),
}

/// One per process. Cloning shares the same runner, stores and run claims.
#[derive(Clone)]
pub struct Dispatcher {
    runner: Arc<dyn ActionRunner>,
    access: Arc<dyn AccessStore>,
    gateways: Arc<dyn GatewayProvider>,
    claims: Arc<RunClaims>,
    log: BridgeLog,
}

impl Dispatcher {
    pub fn new(
        runner: Arc<dyn ActionRunner>,
        access: Arc<dyn AccessStore>,
        gateways: Arc<dyn GatewayProvider>,
        log: BridgeLog,
    ) -> Self {
        Self {
            runner,
            access,
            gateways,
            claims: Arc::new(RunClaims::default()),
            log,
        }
    }

    pub fn acknowledge(&self, event: &InboundEvent) -> Acknowledgement {
        match event {
            InboundEvent::Interaction(InteractionEvent::SubmitConfiguration(_)) => {
                Acknowledgement::UpdateView(verifying_modal())
            }
            _ => Acknowledgement::Empty,
        }
    }

    /// Runs the handler for `event` on its own thread.
    pub fn spawn(&self, event: InboundEvent) -> JoinHandle<()> {
        let dispatcher = self.clone();
        thread::spawn(move || dispatcher.handle(event))
    }

    /// Runs the handler on the calling thread. Errors are logged, never
    /// returned.
    pub fn handle(&self, event: InboundEvent) {
        let kind = event.kind();
        let team = event
            .team_id()
            .map(TeamId::to_string)
            .unwrap_or_else(|| "-".to_string());
        let result = match event {
            InboundEvent::Message(message) => self.on_message(&message),
            InboundEvent::Interaction(interaction) => self.on_interaction(interaction),
            InboundEvent::HomeOpened(opened) => self.on_home_opened(&opened),
        };
        if let Err(err) = result {
            self.log.error(
                "dispatch.handler.failed",
                &format!("{} handler for team {team}: {err}", kind_name(kind)),
            );
        }
    }

    fn on_message(&self, message: &UserMessage) -> Result<(), FlowError> {
        let gateway = self.gateways.gateway_for(&message.team_id)?;
        let access = self.access.fetch(&message.team_id)?;
        let flow = ApprovalFlow::new(
            self.runner.as_ref(),
            gateway.as_ref(),
            &self.claims,
            &self.log,
        );
        let outcome = flow.handle_request(access.as_ref(), message)?;
        if let RequestOutcome::Failed { message: reason } = &outcome {
            self.log.debug("dispatch.message.failed", reason);
        }
        Ok(())
    }

    fn on_interaction(&self, interaction: InteractionEvent) -> Result<(), FlowError> {
        match interaction {
            InteractionEvent::Approval(approval) => {
                let gateway = self.gateways.gateway_for(&approval.team_id)?;
                let access = self.access.fetch(&approval.team_id)?;
                let flow = ApprovalFlow::new(
                    self.runner.as_ref(),
                    gateway.as_ref(),
                    &self.claims,
                    &self.log,
                );
                if let DecisionOutcome::Ignored(reason) =
                    flow.handle_decision(access.as_ref(), &approval)?
                {
                    self.log.debug(
                        "dispatch.decision.ignored",
                        &format!(
                            "channel {} message {}: {reason:?}",
                            approval.channel_id, approval.message_ts
                        ),
                    );
                }
            }
            InteractionEvent::OpenConfiguration {
                team_id,
                trigger_id,
            } => {
                let gateway = self.gateways.gateway_for(&team_id)?;
                ConfigurationFlow::new(
                    self.runner.as_ref(),
                    gateway.as_ref(),
                    self.access.as_ref(),
                    &self.log,
                )
                .open(&team_id, &trigger_id)?;
            }
            InteractionEvent::SubmitConfiguration(submission) => {
                let gateway = self.gateways.gateway_for(&submission.team_id)?;
                ConfigurationFlow::new(
                    self.runner.as_ref(),
                    gateway.as_ref(),
                    self.access.as_ref(),
                    &self.log,
                )
                .submit(&submission)?;
            }
            InteractionEvent::Unrecognized { description, .. } => {
                self.log
                    .debug("dispatch.interaction.unrecognized", &description);
            }
        }
        Ok(())
    }

    fn on_home_opened(&self, opened: &HomeOpened) -> Result<(), FlowError> {
        let gateway = self.gateways.gateway_for(&opened.team_id)?;
        let access = self.access.fetch(&opened.team_id)?;
        publish_home(
            self.runner.as_ref(),
            gateway.as_ref(),
            &self.log,
            access.as_ref(),
            &opened.user_id,
        )?;
        Ok(())
    }
}

fn kind_name(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Message => "message",
        EventKind::HomeOpened => "home_opened",
        EventKind::Interaction => "interaction",
    }
}
