//! Closed block model for everything the bridge renders into Slack.
//!
//! Renderers build `Block` values; only the gateway turns them into Block
//! Kit JSON, so the shapes the bridge can emit are fixed here.

use serde_json::{json, Value};

/// Element action id used by every single-line input the bridge renders.
pub const INPUT_ELEMENT_ACTION_ID: &str = "content";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Header {
        text: String,
    },
    Text {
        text: String,
        accessory: Option<Button>,
    },
    Input {
        block_id: String,
        label: String,
        hint: Option<String>,
        initial_value: Option<String>,
    },
    Actions {
        elements: Vec<Button>,
    },
    Divider,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub action_id: String,
    pub text: String,
    pub style: Option<ButtonStyle>,
    pub value: Option<String>,
}

impl Button {
    pub fn new(action_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            text: text.into(),
            style: None,
            value: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.style = Some(ButtonStyle::Primary);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    fn to_slack_json(&self) -> Value {
        let mut button = json!({
            "type": "button",
            "action_id": self.action_id,
            "text": plain_text(&self.text),
        });
        if let Some(style) = self.style {
            button["style"] = json!(match style {
                ButtonStyle::Primary => "primary",
            });
        }
        if let Some(value) = &self.value {
            button["value"] = json!(value);
        }
        button
    }
}

impl Block {
    pub fn header(text: impl Into<String>) -> Self {
        Self::Header { text: text.into() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            accessory: None,
        }
    }

    pub fn text_with_button(text: impl Into<String>, button: Button) -> Self {
        Self::Text {
            text: text.into(),
            accessory: Some(button),
        }
    }

    pub fn to_slack_json(&self) -> Value {
        match self {
            Self::Header { text } => json!({
                "type": "header",
                "text": plain_text(text),
            }),
            Self::Text { text, accessory } => {
                let mut section = json!({
                    "type": "section",
                    "text": { "type": "mrkdwn", "text": text },
                });
                if let Some(button) = accessory {
                    section["accessory"] = button.to_slack_json();
                }
                section
            }
            Self::Input {
                block_id,
                label,
                hint,
                initial_value,
            } => {
                let mut element = json!({
                    "type": "plain_text_input",
                    "action_id": INPUT_ELEMENT_ACTION_ID,
                });
                if let Some(initial) = initial_value.as_ref().filter(|v| !v.is_empty()) {
                    element["initial_value"] = json!(initial);
                }
                let mut input = json!({
                    "type": "input",
                    "block_id": block_id,
                    "label": plain_text(label),
                    "element": element,
                });
                if let Some(hint) = hint {
                    input["hint"] = plain_text(hint);
                }
                input
            }
            Self::Actions { elements } => json!({
                "type": "actions",
                "elements": elements.iter().map(Button::to_slack_json).collect::<Vec<_>>(),
            }),
            Self::Divider => json!({ "type": "divider" }),
        }
    }
}

/// A chat message body. `text` is the notification fallback and the whole
/// message when `blocks` is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
    pub blocks: Vec<Block>,
}

impl ChatMessage {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            blocks: Vec::new(),
        }
    }

    pub fn with_blocks(text: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            text: text.into(),
            blocks,
        }
    }
}

pub fn blocks_to_slack_json(blocks: &[Block]) -> Value {
    Value::Array(blocks.iter().map(Block::to_slack_json).collect())
}

/// Modal surface. `private_metadata` identifies the modal when its
/// submission comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalView {
    pub private_metadata: String,
    pub title: String,
    pub submit: Option<String>,
    pub close: Option<String>,
    pub blocks: Vec<Block>,
}

impl ModalView {
    pub fn to_slack_json(&self) -> Value {
        let mut view = json!({
            "type": "modal",
            "private_metadata": self.private_metadata,
            "title": plain_text(&self.title),
            "blocks": blocks_to_slack_json(&self.blocks),
        });
        if let Some(submit) = &self.submit {
            view["submit"] = plain_text(submit);
        }
        if let Some(close) = &self.close {
            view["close"] = plain_text(close);
        }
        view
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomeView {
    pub blocks: Vec<Block>,
}

impl HomeView {
    pub fn to_slack_json(&self) -> Value {
        json!({
            "type": "home",
            "blocks": blocks_to_slack_json(&self.blocks),
        })
    }
}

fn plain_text(text: &str) -> Value {
    json!({ "type": "plain_text", "text": text })
}
