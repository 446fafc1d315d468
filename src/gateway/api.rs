use super::GatewayError;
use crate::interaction::blocks::{blocks_to_slack_json, ChatMessage, HomeView, ModalView};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Used when Slack answers 429 without a `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Slack Web API client bound to one token (bot or app-level).
#[derive(Debug, Clone)]
pub struct SlackApiClient {
    api_base: String,
    token: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct EmptyData {}

#[derive(Debug, Clone, Deserialize)]
struct OpenConnectionData {
    url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct PostedMessageData {
    ts: String,
}

/// Identity behind a bot token, from `auth.test`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthIdentity {
    pub team_id: String,
    #[serde(default)]
    pub team: String,
    pub user_id: String,
    #[serde(default)]
    pub bot_id: Option<String>,
}

impl SlackApiClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            token: token.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = self.endpoint(method);
        let body = serde_json::to_value(body).map_err(|e| GatewayError::ApiRequest(e.to_string()))?;
        let payload: Value = match ureq::post(&url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .send_json(body)
        {
            Ok(response) => response
                .into_json()
                .map_err(|e| GatewayError::ApiRequest(format!("{method}: {e}")))?,
            Err(ureq::Error::Status(429, response)) => {
                let retry_after_secs = response
                    .header("Retry-After")
                    .and_then(|value| value.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                return Err(GatewayError::RateLimited {
                    method: method.to_string(),
                    retry_after_secs,
                });
            }
            Err(err) => return Err(GatewayError::ApiRequest(format!("{method}: {err}"))),
        };
        let envelope: SlackEnvelope = serde_json::from_value(payload.clone())
            .map_err(|e| GatewayError::ApiRequest(format!("{method}: {e}")))?;
        if !envelope.ok {
            return Err(GatewayError::ApiResponse(
                envelope.error.unwrap_or_else(|| format!("{method} failed")),
            ));
        }
        serde_json::from_value(payload).map_err(|e| GatewayError::ApiRequest(format!("{method}: {e}")))
    }

    pub fn auth_test(&self) -> Result<AuthIdentity, GatewayError> {
        self.post_json("auth.test", &json!({}))
    }

    /// Requires an app-level token. Returns the Socket Mode WebSocket URL.
    pub fn open_socket_connection(&self) -> Result<String, GatewayError> {
        let data: OpenConnectionData = self.post_json("apps.connections.open", &json!({}))?;
        Ok(data.url)
    }

    pub fn post_message(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        message: &ChatMessage,
    ) -> Result<String, GatewayError> {
        let mut body = message_body(channel_id, message);
        body["unfurl_links"] = json!(false);
        if let Some(thread_ts) = thread_ts.filter(|v| !v.trim().is_empty()) {
            body["thread_ts"] = json!(thread_ts);
        }
        let data: PostedMessageData = self.post_json("chat.postMessage", &body)?;
        Ok(data.ts)
    }

    pub fn update_message(
        &self,
        channel_id: &str,
        ts: &str,
        message: &ChatMessage,
    ) -> Result<(), GatewayError> {
        let mut body = message_body(channel_id, message);
        body["ts"] = json!(ts);
        let _: EmptyData = self.post_json("chat.update", &body)?;
        Ok(())
    }

    pub fn open_view(&self, trigger_id: &str, view: &ModalView) -> Result<(), GatewayError> {
        let body = json!({ "trigger_id": trigger_id, "view": view.to_slack_json() });
        let _: EmptyData = self.post_json("views.open", &body)?;
        Ok(())
    }

    pub fn update_view(&self, view_id: &str, view: &ModalView) -> Result<(), GatewayError> {
        let body = json!({ "view_id": view_id, "view": view.to_slack_json() });
        let _: EmptyData = self.post_json("views.update", &body)?;
        Ok(())
    }

    pub fn publish_view(&self, user_id: &str, view: &HomeView) -> Result<(), GatewayError> {
        let body = json!({ "user_id": user_id, "view": view.to_slack_json() });
        let _: EmptyData = self.post_json("views.publish", &body)?;
        Ok(())
    }
}

fn message_body(channel_id: &str, message: &ChatMessage) -> Value {
    let mut body = json!({
        "channel": channel_id,
        "text": message.text,
    });
    if !message.blocks.is_empty() {
        body["blocks"] = blocks_to_slack_json(&message.blocks);
    }
    body
}
