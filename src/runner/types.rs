use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parameter values keyed by parameter key, as supplied by the user or
/// suggested by the runner.
pub type InputValues = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub key: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, rename = "type", deserialize_with = "null_as_empty")]
    pub kind: String,
    #[serde(default)]
    pub input_parameters: Vec<ActionParameter>,
    #[serde(default)]
    pub output_parameters: Vec<ActionParameter>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub plugin_id: String,
}

impl ActionDefinition {
    pub fn has_input_parameters(&self) -> bool {
        !self.input_parameters.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionParameter {
    pub key: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, rename = "type", deserialize_with = "null_as_empty")]
    pub kind: String,
    #[serde(default)]
    pub validation: ParameterValidation,
}

impl ActionParameter {
    pub fn is_required(&self) -> bool {
        self.validation.required
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValidation {
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSummary {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub key: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDetail {
    #[serde(flatten)]
    pub summary: PluginSummary,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyOutcome {
    pub identified: bool,
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_map")]
    pub input: InputValues,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExecutionOutput {
    #[serde(default, deserialize_with = "lenient_string_map")]
    pub output: BTreeMap<String, String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Runner maps are documented as string-to-string, but some plugins emit
/// numbers or nested objects. Non-string values keep their JSON text so the
/// output formatter can still parse them back into structure.
fn lenient_string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect())
}
