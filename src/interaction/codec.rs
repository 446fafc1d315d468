//! State threaded through Slack round-trips.
//!
//! The bridge keeps no session store. Everything needed to resume an
//! approval travels inside the button value of the proposal message, and
//! user-edited inputs are re-read from the form state on every interaction.

use super::blocks::INPUT_ELEMENT_ACTION_ID;
use crate::runner::{ActionDefinition, ActionParameter, InputValues};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Slack rejects button values longer than this.
pub const MAX_TOKEN_CHARS: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("interaction state is {size} characters, limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("failed to encode interaction state: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode interaction state: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionState {
    pub action: ActionDefinition,
}

pub fn encode(action: &ActionDefinition) -> Result<String, CodecError> {
    let token = serde_json::to_string(&InteractionState {
        action: action.clone(),
    })
    .map_err(CodecError::Encode)?;
    let size = token.chars().count();
    if size > MAX_TOKEN_CHARS {
        return Err(CodecError::PayloadTooLarge {
            size,
            limit: MAX_TOKEN_CHARS,
        });
    }
    Ok(token)
}

pub fn decode(token: &str) -> Result<ActionDefinition, CodecError> {
    serde_json::from_str::<InteractionState>(token)
        .map(|state| state.action)
        .map_err(CodecError::Decode)
}

/// Makes free text fit a single-line input: `\` becomes `\\` and a newline
/// becomes `\n`.
pub fn escape_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Exact inverse of [`escape_newlines`]. Sequences it never produces are
/// kept verbatim, including a trailing lone backslash.
pub fn unescape_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FormElementState {
    #[serde(default)]
    pub value: Option<String>,
}

/// Slack `state.values`: block id -> element action id -> element state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct FormState(BTreeMap<String, BTreeMap<String, FormElementState>>);

impl FormState {
    pub fn value(&self, block_id: &str, action_id: &str) -> Option<&str> {
        self.0
            .get(block_id)
            .and_then(|elements| elements.get(action_id))
            .and_then(|element| element.value.as_deref())
    }

    /// Value of the bridge's single-line input inside `block_id`.
    pub fn input_value(&self, block_id: &str) -> Option<&str> {
        self.value(block_id, INPUT_ELEMENT_ACTION_ID)
    }

    pub fn with_input(mut self, block_id: &str, value: Option<&str>) -> Self {
        self.0.entry(block_id.to_string()).or_default().insert(
            INPUT_ELEMENT_ACTION_ID.to_string(),
            FormElementState {
                value: value.map(str::to_string),
            },
        );
        self
    }
}

/// One entry per parameter key. Blocks missing from the form and cleared
/// inputs both read as an empty string.
pub fn extract_input_values(form: &FormState, parameters: &[ActionParameter]) -> InputValues {
    parameters
        .iter()
        .map(|parameter| {
            let value = form
                .input_value(&parameter.key)
                .map(unescape_newlines)
                .unwrap_or_default();
            (parameter.key.clone(), value)
        })
        .collect()
}

/// Pretty-prints action output, parsing each value as JSON when it is JSON
/// and keeping the raw string otherwise.
pub fn format_output(output: &BTreeMap<String, String>) -> String {
    let structured: serde_json::Map<String, Value> = output
        .iter()
        .map(|(key, raw)| {
            let value =
                serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            (key.clone(), value)
        })
        .collect();
    serde_json::to_string_pretty(&Value::Object(structured)).unwrap_or_default()
}
