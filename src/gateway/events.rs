//! Socket Mode frames -> [`InboundEvent`].
//!
//! Parsing is total: frames the bridge does not act on come back as
//! `None` or `Unrecognized` so the socket loop can still acknowledge them.

use crate::events::{
    ApprovalInteraction, ConfigurationSubmission, HomeOpened, InboundEvent, InteractionEvent,
    UserMessage,
};
use crate::interaction::approval::Decision;
use crate::interaction::codec::FormState;
use crate::interaction::configuration::{CONFIG_MODAL_METADATA, OPEN_CONFIGURATION_ACTION_ID};
use crate::shared::{ChannelId, TeamId, UserId};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    Envelope {
        envelope_id: String,
        event: Option<InboundEvent>,
    },
    Other,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EventCallback {
    #[serde(default)]
    team_id: Option<String>,
    event: RawEvent,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    team: Option<String>,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    channel_type: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ts: String,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    tab: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IdRef {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawState {
    #[serde(default)]
    values: FormState,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(default)]
    action_id: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawContainer {
    #[serde(default)]
    message_ts: Option<String>,
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessageRef {
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawView {
    #[serde(default)]
    id: String,
    #[serde(default)]
    private_metadata: String,
    #[serde(default)]
    state: RawState,
}

#[derive(Debug, Deserialize)]
struct InteractivePayload {
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    team: Option<IdRef>,
    #[serde(default)]
    user: Option<IdRef>,
    #[serde(default)]
    channel: Option<IdRef>,
    #[serde(default)]
    container: RawContainer,
    #[serde(default)]
    message: Option<RawMessageRef>,
    #[serde(default)]
    trigger_id: String,
    #[serde(default)]
    actions: Vec<RawAction>,
    #[serde(default)]
    state: RawState,
    #[serde(default)]
    view: Option<RawView>,
}

pub fn parse_frame(text: &str) -> Result<SocketFrame, serde_json::Error> {
    let frame: RawFrame = serde_json::from_str(text)?;
    match frame.r#type.as_str() {
        "hello" => return Ok(SocketFrame::Hello),
        "disconnect" => {
            return Ok(SocketFrame::Disconnect {
                reason: frame.reason.unwrap_or_default(),
            })
        }
        _ => {}
    }
    let Some(envelope_id) = frame.envelope_id else {
        return Ok(SocketFrame::Other);
    };
    let event = match (frame.r#type.as_str(), frame.payload) {
        ("events_api", Some(payload)) => serde_json::from_value::<EventCallback>(payload)
            .ok()
            .and_then(event_from_callback),
        ("interactive", Some(payload)) => serde_json::from_value::<InteractivePayload>(payload)
            .ok()
            .map(interaction_from_payload)
            .map(InboundEvent::Interaction),
        _ => None,
    };
    Ok(SocketFrame::Envelope { envelope_id, event })
}

fn event_from_callback(callback: EventCallback) -> Option<InboundEvent> {
    let event = callback.event;
    let team_id = TeamId::parse(callback.team_id.as_deref().or(event.team.as_deref())?).ok()?;
    match event.r#type.as_str() {
        "app_home_opened" => {
            if event.tab.as_deref() != Some("home") {
                return None;
            }
            let user_id = UserId::parse(event.user.as_deref()?).ok()?;
            Some(InboundEvent::HomeOpened(HomeOpened { team_id, user_id }))
        }
        "message" | "app_mention" => {
            if !is_user_request(&event) {
                return None;
            }
            Some(InboundEvent::Message(UserMessage {
                team_id,
                channel_id: ChannelId::parse(&event.channel).ok()?,
                user_id: UserId::parse(event.user.as_deref()?).ok()?,
                text: event.text.unwrap_or_default(),
                ts: event.ts,
                thread_ts: event.thread_ts.filter(|ts| !ts.trim().is_empty()),
            }))
        }
        _ => None,
    }
}

/// Human-authored messages sent to the bridge: DMs, or mentions anywhere.
fn is_user_request(event: &RawEvent) -> bool {
    if event.user.is_none() || event.bot_id.is_some() || event.subtype.is_some() {
        return false;
    }
    if event.channel.trim().is_empty() || event.ts.trim().is_empty() {
        return false;
    }
    if event.r#type == "app_mention" {
        return true;
    }
    let channel_type = event
        .channel_type
        .as_deref()
        .or_else(|| event.channel.starts_with('D').then_some("im"));
    channel_type == Some("im")
}

fn interaction_from_payload(payload: InteractivePayload) -> InteractionEvent {
    let team_id = payload
        .team
        .as_ref()
        .and_then(|team| TeamId::parse(&team.id).ok());
    let unrecognized = |team_id: Option<TeamId>, description: String| {
        InteractionEvent::Unrecognized {
            team_id,
            description,
        }
    };
    let Some(team) = team_id.clone() else {
        return unrecognized(None, format!("{} without team", payload.r#type));
    };

    match payload.r#type.as_str() {
        "block_actions" => {
            let Some(action) = payload.actions.first() else {
                return unrecognized(team_id, "block_actions without actions".to_string());
            };
            if action.action_id == OPEN_CONFIGURATION_ACTION_ID {
                return InteractionEvent::OpenConfiguration {
                    team_id: team,
                    trigger_id: payload.trigger_id,
                };
            }
            let Some(decision) = Decision::from_action_id(&action.action_id) else {
                return unrecognized(team_id, format!("block action `{}`", action.action_id));
            };
            let channel = payload
                .channel
                .as_ref()
                .map(|channel| channel.id.clone())
                .or_else(|| payload.container.channel_id.clone());
            let message_ts = payload
                .container
                .message_ts
                .clone()
                .or_else(|| payload.message.as_ref().and_then(|m| m.ts.clone()));
            let parsed = (
                channel.and_then(|id| ChannelId::parse(&id).ok()),
                payload
                    .user
                    .as_ref()
                    .and_then(|user| UserId::parse(&user.id).ok()),
                message_ts,
            );
            let (Some(channel_id), Some(user_id), Some(message_ts)) = parsed else {
                return unrecognized(
                    team_id,
                    format!("block action `{}` outside a message", action.action_id),
                );
            };
            InteractionEvent::Approval(ApprovalInteraction {
                team_id: team,
                user_id,
                channel_id,
                message_ts,
                decision,
                state_token: action.value.clone().unwrap_or_default(),
                form: payload.state.values,
            })
        }
        "view_submission" => {
            let view = payload.view.unwrap_or_default();
            let user_id = payload
                .user
                .as_ref()
                .and_then(|user| UserId::parse(&user.id).ok());
            match user_id {
                Some(user_id) if view.private_metadata == CONFIG_MODAL_METADATA => {
                    InteractionEvent::SubmitConfiguration(ConfigurationSubmission {
                        team_id: team,
                        user_id,
                        view_id: view.id,
                        form: view.state.values,
                    })
                }
                _ => unrecognized(
                    team_id,
                    format!("view submission `{}`", view.private_metadata),
                ),
            }
        }
        other => unrecognized(team_id, format!("interaction `{other}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events_api(event: serde_json::Value) -> String {
        json!({
            "envelope_id": "env-1",
            "type": "events_api",
            "payload": { "team_id": "T1", "event": event },
        })
        .to_string()
    }

    fn parsed_event(text: &str) -> Option<InboundEvent> {
        match parse_frame(text).expect("frame") {
            SocketFrame::Envelope { envelope_id, event } => {
                assert_eq!(envelope_id, "env-1");
                event
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn direct_message_becomes_user_request() {
        let event = parsed_event(&events_api(json!({
            "type": "message",
            "channel": "D1",
            "channel_type": "im",
            "user": "U1",
            "text": "send a report",
            "ts": "100.1",
        })));
        let Some(InboundEvent::Message(message)) = event else {
            panic!("expected message");
        };
        assert_eq!(message.channel_id.as_str(), "D1");
        assert_eq!(message.text, "send a report");
        assert_eq!(message.thread_ts, None);
    }

    #[test]
    fn channel_chatter_and_bot_messages_are_dropped() {
        assert!(parsed_event(&events_api(json!({
            "type": "message", "channel": "C1", "channel_type": "channel",
            "user": "U1", "text": "hi", "ts": "1.0",
        })))
        .is_none());
        assert!(parsed_event(&events_api(json!({
            "type": "message", "channel": "D1", "channel_type": "im",
            "user": "U1", "bot_id": "B1", "text": "hi", "ts": "1.0",
        })))
        .is_none());
        assert!(parsed_event(&events_api(json!({
            "type": "message", "channel": "D1", "channel_type": "im",
            "user": "U1", "subtype": "message_changed", "ts": "1.0",
        })))
        .is_none());
    }

    #[test]
    fn mention_in_thread_keeps_thread_ts() {
        let event = parsed_event(&events_api(json!({
            "type": "app_mention",
            "channel": "C1",
            "user": "U1",
            "text": "<@UBOT> run it",
            "ts": "200.2",
            "thread_ts": "100.0",
        })));
        let Some(InboundEvent::Message(message)) = event else {
            panic!("expected message");
        };
        assert_eq!(message.thread_ts.as_deref(), Some("100.0"));
    }

    #[test]
    fn home_opened_only_for_home_tab() {
        let home = parsed_event(&events_api(json!({
            "type": "app_home_opened", "user": "U1", "tab": "home",
        })));
        assert!(matches!(home, Some(InboundEvent::HomeOpened(_))));
        let messages = parsed_event(&events_api(json!({
            "type": "app_home_opened", "user": "U1", "tab": "messages",
        })));
        assert!(messages.is_none());
    }

    #[test]
    fn run_click_becomes_approval_with_form_state() {
        let frame = json!({
            "envelope_id": "env-1",
            "type": "interactive",
            "payload": {
                "type": "block_actions",
                "team": { "id": "T1" },
                "user": { "id": "U1" },
                "channel": { "id": "C1" },
                "container": { "message_ts": "300.3" },
                "trigger_id": "trig",
                "actions": [{ "action_id": "run_action", "value": "{\"action\":{}}" }],
                "state": { "values": { "to": { "content": { "type": "plain_text_input", "value": "ops" } } } },
            },
        });
        let Some(InboundEvent::Interaction(InteractionEvent::Approval(approval))) =
            parsed_event(&frame.to_string())
        else {
            panic!("expected approval");
        };
        assert_eq!(approval.decision, Decision::Run);
        assert_eq!(approval.message_ts, "300.3");
        assert_eq!(approval.state_token, "{\"action\":{}}");
        assert_eq!(approval.form.input_value("to"), Some("ops"));
    }

    #[test]
    fn configuration_button_and_submission_are_routed() {
        let open = json!({
            "envelope_id": "env-1",
            "type": "interactive",
            "payload": {
                "type": "block_actions",
                "team": { "id": "T1" },
                "user": { "id": "U1" },
                "trigger_id": "trig-1",
                "actions": [{ "action_id": "update_configuration" }],
            },
        });
        assert_eq!(
            parsed_event(&open.to_string()),
            Some(InboundEvent::Interaction(InteractionEvent::OpenConfiguration {
                team_id: TeamId::parse("T1").expect("team"),
                trigger_id: "trig-1".to_string(),
            }))
        );

        let submit = json!({
            "envelope_id": "env-1",
            "type": "interactive",
            "payload": {
                "type": "view_submission",
                "team": { "id": "T1" },
                "user": { "id": "U1" },
                "view": {
                    "id": "V1",
                    "private_metadata": "update_configuration_modal",
                    "state": { "values": { "runner_url": { "content": { "value": "https://r" } } } },
                },
            },
        });
        let Some(InboundEvent::Interaction(InteractionEvent::SubmitConfiguration(submission))) =
            parsed_event(&submit.to_string())
        else {
            panic!("expected submission");
        };
        assert_eq!(submission.view_id, "V1");
        assert_eq!(submission.form.input_value("runner_url"), Some("https://r"));
    }

    #[test]
    fn unknown_block_action_is_unrecognized() {
        let frame = json!({
            "envelope_id": "env-1",
            "type": "interactive",
            "payload": {
                "type": "block_actions",
                "team": { "id": "T1" },
                "user": { "id": "U1" },
                "actions": [{ "action_id": "something_else" }],
            },
        });
        assert!(matches!(
            parsed_event(&frame.to_string()),
            Some(InboundEvent::Interaction(InteractionEvent::Unrecognized { .. }))
        ));
    }

    #[test]
    fn control_frames_parse() {
        assert_eq!(
            parse_frame(r#"{"type":"hello"}"#).expect("hello"),
            SocketFrame::Hello
        );
        assert_eq!(
            parse_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#).expect("frame"),
            SocketFrame::Disconnect {
                reason: "refresh_requested".to_string()
            }
        );
        assert!(parse_frame("not json").is_err());
    }
}
