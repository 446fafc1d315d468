use super::{
    ActionDefinition, ExecutionOutput, IdentifyOutcome, InputValues, PluginDetail,
    PluginSummary, RunnerAccess, RunnerError,
};
use crate::shared::BridgeLog;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-api-key";

/// Operations the bridge needs from a runner. Implementations hold no state
/// between calls.
pub trait ActionRunner: Send + Sync {
    fn identify(&self, access: &RunnerAccess, text: &str) -> Result<IdentifyOutcome, RunnerError>;

    fn fetch_action(
        &self,
        access: &RunnerAccess,
        action_id: &str,
    ) -> Result<ActionDefinition, RunnerError>;

    fn list_plugins(&self, access: &RunnerAccess) -> Result<Vec<PluginSummary>, RunnerError>;

    fn fetch_plugin(
        &self,
        access: &RunnerAccess,
        plugin_id: &str,
    ) -> Result<PluginDetail, RunnerError>;

    fn execute(
        &self,
        access: &RunnerAccess,
        action_id: &str,
        input: &InputValues,
    ) -> Result<ExecutionOutput, RunnerError>;

    /// Connectivity probe. Never fails; any transport or response problem
    /// reads as `false`.
    fn verify_access(&self, access: &RunnerAccess) -> bool;
}

#[derive(Debug, Deserialize)]
struct RunnerEnvelope<T> {
    #[serde(default)]
    status: Option<String>,
    data: Option<T>,
    #[serde(default)]
    error: Option<RunnerErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RunnerErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunnerClient {
    agent: ureq::Agent,
    log: BridgeLog,
}

impl RunnerClient {
    pub fn new(timeout: Option<Duration>, log: BridgeLog) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
            log,
        }
    }

    fn get<T: DeserializeOwned>(&self, access: &RunnerAccess, path: &str) -> Result<T, RunnerError> {
        let request = self
            .agent
            .get(&access.endpoint(path))
            .set(API_KEY_HEADER, &access.runner_api_key);
        read_envelope(request.call())
    }

    fn post<T: DeserializeOwned>(
        &self,
        access: &RunnerAccess,
        path: &str,
        body: Value,
    ) -> Result<T, RunnerError> {
        let request = self
            .agent
            .post(&access.endpoint(path))
            .set(API_KEY_HEADER, &access.runner_api_key);
        read_envelope(request.send_json(body))
    }
}

fn encode_segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

fn read_envelope<T: DeserializeOwned>(
    result: Result<ureq::Response, ureq::Error>,
) -> Result<T, RunnerError> {
    match result {
        Ok(response) => {
            let raw = response
                .into_string()
                .map_err(|err| RunnerError::Transport(err.to_string()))?;
            let envelope: RunnerEnvelope<T> =
                serde_json::from_str(&raw).map_err(|err| RunnerError::malformed(err.to_string()))?;
            if let Some(status) = envelope.status.as_deref().filter(|s| *s != "success") {
                let message = envelope
                    .error
                    .and_then(|body| body.message)
                    .unwrap_or_else(|| format!("runner reported status `{status}`"));
                return Err(RunnerError::Upstream {
                    status: None,
                    message,
                });
            }
            envelope
                .data
                .ok_or_else(|| RunnerError::malformed("missing `data` field".to_string()))
        }
        Err(ureq::Error::Status(code, response)) => {
            let status_text = response.status_text().to_string();
            let body = response.into_string().unwrap_or_default();
            Err(RunnerError::Upstream {
                status: Some(code),
                message: upstream_error_message(&body)
                    .unwrap_or_else(|| format!("runner responded with {code} {status_text}")),
            })
        }
        Err(ureq::Error::Transport(transport)) => Err(RunnerError::Transport(transport.to_string())),
    }
}

fn upstream_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .pointer("/error/message")
        .and_then(Value::as_str)
        .filter(|message| !message.trim().is_empty())
        .map(str::to_string)
}

impl ActionRunner for RunnerClient {
    fn identify(&self, access: &RunnerAccess, text: &str) -> Result<IdentifyOutcome, RunnerError> {
        self.post(access, "v1/actions/identify", json!({ "prompt": text }))
    }

    fn fetch_action(
        &self,
        access: &RunnerAccess,
        action_id: &str,
    ) -> Result<ActionDefinition, RunnerError> {
        let path = format!("v1/actions/{}", encode_segment(action_id));
        self.get(access, &path).map_err(|err| match err {
            RunnerError::Upstream {
                status: Some(404), ..
            } => RunnerError::NotFound {
                action_id: action_id.to_string(),
            },
            other => other,
        })
    }

    fn list_plugins(&self, access: &RunnerAccess) -> Result<Vec<PluginSummary>, RunnerError> {
        self.get(access, "v1/plugins")
    }

    fn fetch_plugin(
        &self,
        access: &RunnerAccess,
        plugin_id: &str,
    ) -> Result<PluginDetail, RunnerError> {
        let path = format!("v1/plugins/{}", encode_segment(plugin_id));
        self.get(access, &path)
    }

    fn execute(
        &self,
        access: &RunnerAccess,
        action_id: &str,
        input: &InputValues,
    ) -> Result<ExecutionOutput, RunnerError> {
        let path = format!("v1/actions/{}/run", encode_segment(action_id));
        self.post(access, &path, json!({ "input": input }))
    }

    fn verify_access(&self, access: &RunnerAccess) -> bool {
        let result = self
            .agent
            .get(&access.endpoint("v1/verify-access"))
            .set(API_KEY_HEADER, &access.runner_api_key)
            .call();
        match result {
            Ok(_) => true,
            Err(err) => {
                let detail = match err {
                    ureq::Error::Status(code, response) => {
                        let body = response.into_string().unwrap_or_default();
                        upstream_error_message(&body)
                            .map(|message| format!("{code}: {message}"))
                            .unwrap_or_else(|| code.to_string())
                    }
                    ureq::Error::Transport(transport) => transport.to_string(),
                };
                self.log.warn(
                    "runner.verify_access.failed",
                    &format!(
                        "runner {} key {}: {detail}",
                        access.runner_url,
                        access.api_key_fingerprint()
                    ),
                );
                false
            }
        }
    }
}
