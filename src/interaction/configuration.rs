//! Connect-to-runner modal: open, verify, store, refresh home.

use super::blocks::{Block, ModalView};
use super::home::publish_home;
use super::FlowError;
use crate::events::ConfigurationSubmission;
use crate::gateway::ConversationGateway;
use crate::runner::{ActionRunner, RunnerAccess};
use crate::shared::{BridgeLog, TeamId};
use crate::store::AccessStore;

pub const OPEN_CONFIGURATION_ACTION_ID: &str = "update_configuration";
pub const CONFIG_MODAL_METADATA: &str = "update_configuration_modal";
pub const RUNNER_URL_BLOCK_ID: &str = "runner_url";
pub const API_KEY_BLOCK_ID: &str = "api_key";

const MODAL_TITLE: &str = "Connect to runner";
pub const VERIFY_FAILED_MESSAGE: &str =
    "Can not connect to the runner with the provided configuration. Please check the runner URL and API Key.";

/// The editable modal. `runner_url` pre-fills the URL input; the key is
/// never echoed back.
pub fn configuration_modal(runner_url: Option<&str>, error: Option<&str>) -> ModalView {
    let mut blocks = Vec::new();
    if let Some(error) = error {
        blocks.push(Block::text(format!("🔴 ERROR: {error}")));
    }
    blocks.push(Block::Input {
        block_id: RUNNER_URL_BLOCK_ID.to_string(),
        label: "Runner URL".to_string(),
        hint: None,
        initial_value: runner_url.map(str::to_string),
    });
    blocks.push(Block::Input {
        block_id: API_KEY_BLOCK_ID.to_string(),
        label: "API Key".to_string(),
        hint: None,
        initial_value: None,
    });
    blocks.push(Block::text(
        "After you connect the app to the runner, every user in this Slack workspace can run actions from the runner.",
    ));
    ModalView {
        private_metadata: CONFIG_MODAL_METADATA.to_string(),
        title: MODAL_TITLE.to_string(),
        submit: Some("Connect".to_string()),
        close: None,
        blocks,
    }
}

/// Shown by the submission ack while the runner is being checked.
pub fn verifying_modal() -> ModalView {
    ModalView {
        private_metadata: CONFIG_MODAL_METADATA.to_string(),
        title: MODAL_TITLE.to_string(),
        submit: None,
        close: Some("Close".to_string()),
        blocks: vec![Block::text("🔵 Verifying the connection to the runner...")],
    }
}

pub fn connected_modal(access: &RunnerAccess) -> ModalView {
    ModalView {
        private_metadata: CONFIG_MODAL_METADATA.to_string(),
        title: MODAL_TITLE.to_string(),
        submit: None,
        close: Some("Done".to_string()),
        blocks: vec![Block::text(format!(
            "🟢 The app is connected to `{}`. Every user in this workspace can now run actions from the runner.",
            access.runner_url
        ))],
    }
}

pub fn submitted_access(submission: &ConfigurationSubmission) -> RunnerAccess {
    RunnerAccess::new(
        submission
            .form
            .input_value(RUNNER_URL_BLOCK_ID)
            .unwrap_or_default(),
        submission
            .form
            .input_value(API_KEY_BLOCK_ID)
            .unwrap_or_default(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationOutcome {
    Rejected,
    Connected,
}

pub struct ConfigurationFlow<'a> {
    runner: &'a dyn ActionRunner,
    gateway: &'a dyn ConversationGateway,
    store: &'a dyn AccessStore,
    log: &'a BridgeLog,
}

impl<'a> ConfigurationFlow<'a> {
    pub fn new(
        runner: &'a dyn ActionRunner,
        gateway: &'a dyn ConversationGateway,
        store: &'a dyn AccessStore,
        log: &'a BridgeLog,
    ) -> Self {
        Self {
            runner,
            gateway,
            store,
            log,
        }
    }

    pub fn open(&self, team_id: &TeamId, trigger_id: &str) -> Result<(), FlowError> {
        let current = self.store.fetch(team_id)?;
        let modal = configuration_modal(
            current.as_ref().map(|access| access.runner_url.as_str()),
            None,
        );
        self.gateway.open_modal(trigger_id, &modal)?;
        Ok(())
    }

    /// Runs after the submission was acknowledged with `verifying_modal`.
    pub fn submit(
        &self,
        submission: &ConfigurationSubmission,
    ) -> Result<ConfigurationOutcome, FlowError> {
        let access = submitted_access(submission);
        if !access.is_complete() || !self.runner.verify_access(&access) {
            self.log.info(
                "configuration.rejected",
                &format!(
                    "team {} user {} runner {}",
                    submission.team_id, submission.user_id, access.runner_url
                ),
            );
            let modal = configuration_modal(Some(&access.runner_url), Some(VERIFY_FAILED_MESSAGE));
            self.gateway.update_modal(&submission.view_id, &modal)?;
            return Ok(ConfigurationOutcome::Rejected);
        }

        self.store.store(&submission.team_id, &access)?;
        self.log.info(
            "configuration.connected",
            &format!(
                "team {} user {} runner {} key {}",
                submission.team_id,
                submission.user_id,
                access.runner_url,
                access.api_key_fingerprint()
            ),
        );
        self.gateway
            .update_modal(&submission.view_id, &connected_modal(&access))?;
        publish_home(
            self.runner,
            self.gateway,
            self.log,
            Some(&access),
            &submission.user_id,
        )?;
        Ok(ConfigurationOutcome::Connected)
    }
}
