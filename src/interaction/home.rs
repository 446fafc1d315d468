//! App Home tab and the "configuration required" surface.

use super::blocks::{Block, Button, ChatMessage, HomeView};
use super::configuration::OPEN_CONFIGURATION_ACTION_ID;
use crate::gateway::{ConversationGateway, GatewayError};
use crate::runner::{ActionRunner, PluginDetail, RunnerAccess, RunnerError};
use crate::shared::{BridgeLog, UserId};

const SUPPORT_TEXT: &str = "Ask your workspace administrator for the runner URL and API key. \n\nIf the runner is unreachable, check its logs before reconnecting the app.";

fn support_blocks() -> Vec<Block> {
    vec![Block::header("Support"), Block::text(SUPPORT_TEXT)]
}

pub fn not_configured_blocks() -> Vec<Block> {
    let mut blocks = vec![
        Block::header("Configuration required"),
        Block::text("Please connect the app to a runner to continue."),
        Block::Actions {
            elements: vec![Button::new(OPEN_CONFIGURATION_ACTION_ID, "Connect to runner").primary()],
        },
    ];
    blocks.extend(support_blocks());
    blocks
}

/// Reply for chat requests that arrive before the workspace is connected.
pub fn configuration_required_message() -> ChatMessage {
    ChatMessage::with_blocks("Configuration required", not_configured_blocks())
}

/// Plugin list with their actions, one mrkdwn section.
pub fn capability_summary(plugins: &[PluginDetail]) -> String {
    if plugins.is_empty() {
        return "No actions are installed on the runner yet.".to_string();
    }
    let mut lines = Vec::new();
    for plugin in plugins {
        lines.push(format!("*{}*", plugin.summary.title));
        for action in &plugin.actions {
            lines.push(format!("        ⚡ *{}*", action.title));
        }
    }
    lines.join("\n")
}

pub fn fetch_capabilities(
    runner: &dyn ActionRunner,
    access: &RunnerAccess,
) -> Result<Vec<PluginDetail>, RunnerError> {
    runner
        .list_plugins(access)?
        .iter()
        .map(|plugin| runner.fetch_plugin(access, &plugin.id))
        .collect()
}

pub fn authenticated_blocks(
    access: &RunnerAccess,
    capabilities: Result<&[PluginDetail], &RunnerError>,
) -> Vec<Block> {
    let summary = match capabilities {
        Ok(plugins) => capability_summary(plugins),
        Err(err) => format!(
            "🔴 Could not load the available actions: {}",
            err.display_message()
        ),
    };
    let mut blocks = vec![
        Block::text("Welcome! This app lets you run actions from the runner using natural language."),
        Block::text("For example, you can ask the app \"List what you can do\" to see the list of available actions."),
        Block::header("Available actions"),
        Block::text("Below is a list of available actions installed on the runner. You can ask the app to run any of them using natural language. \nThe actions are grouped by the plugins they belong to."),
        Block::text(summary),
        Block::header("Configuration"),
        Block::text("The app is connected to the runner and ready to use:"),
        Block::text_with_button(
            format!(
                "- Runner URL: `{}`\n- API Key: `{}`",
                access.runner_url,
                access.masked_api_key()
            ),
            Button::new(OPEN_CONFIGURATION_ACTION_ID, "Update configuration"),
        ),
    ];
    blocks.extend(support_blocks());
    blocks
}

/// Builds the home view for `access` (or the not-configured view) and
/// publishes it for `user_id`.
pub fn publish_home(
    runner: &dyn ActionRunner,
    gateway: &dyn ConversationGateway,
    log: &BridgeLog,
    access: Option<&RunnerAccess>,
    user_id: &UserId,
) -> Result<(), GatewayError> {
    let blocks = match access.filter(|access| access.is_complete()) {
        Some(access) => {
            let capabilities = fetch_capabilities(runner, access);
            if let Err(err) = &capabilities {
                log.warn(
                    "home.capabilities.failed",
                    &format!("user {user_id}: {}", err.display_message()),
                );
            }
            authenticated_blocks(access, capabilities.as_deref())
        }
        None => not_configured_blocks(),
    };
    gateway.publish_home_view(user_id, &HomeView { blocks })
}
