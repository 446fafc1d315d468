use actionbridge::dispatch::{Acknowledgement, Dispatcher};
use actionbridge::events::{
    ConfigurationSubmission, HomeOpened, InboundEvent, InteractionEvent, UserMessage,
};
use actionbridge::gateway::{ConversationGateway, GatewayError, GatewayProvider};
use actionbridge::interaction::blocks::{Block, ChatMessage, HomeView, ModalView};
use actionbridge::interaction::codec::FormState;
use actionbridge::interaction::configuration::{verifying_modal, VERIFY_FAILED_MESSAGE};
use actionbridge::runner::{
    ActionDefinition, ActionRunner, ExecutionOutput, IdentifyOutcome, InputValues, PluginDetail,
    PluginSummary, RunnerAccess, RunnerError,
};
use actionbridge::shared::{BridgeLog, ChannelId, LogLevel, TeamId, UserId};
use actionbridge::store::{AccessStore, SqliteStore};
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

struct FakeRunner {
    accept_access: bool,
}

fn plugin_summary() -> PluginSummary {
    PluginSummary {
        id: "plugin-1".to_string(),
        key: "mail".to_string(),
        title: "Mail".to_string(),
        description: "Email actions".to_string(),
    }
}

impl ActionRunner for FakeRunner {
    fn identify(&self, _access: &RunnerAccess, _text: &str) -> Result<IdentifyOutcome, RunnerError> {
        Ok(IdentifyOutcome::default())
    }

    fn fetch_action(
        &self,
        _access: &RunnerAccess,
        action_id: &str,
    ) -> Result<ActionDefinition, RunnerError> {
        Err(RunnerError::NotFound {
            action_id: action_id.to_string(),
        })
    }

    fn list_plugins(&self, _access: &RunnerAccess) -> Result<Vec<PluginSummary>, RunnerError> {
        Ok(vec![plugin_summary()])
    }

    fn fetch_plugin(
        &self,
        _access: &RunnerAccess,
        _plugin_id: &str,
    ) -> Result<PluginDetail, RunnerError> {
        Ok(PluginDetail {
            summary: plugin_summary(),
            actions: vec![ActionDefinition {
                id: "act-1".to_string(),
                key: "sendEmail".to_string(),
                title: "Send email".to_string(),
                description: String::new(),
                kind: "create".to_string(),
                input_parameters: Vec::new(),
                output_parameters: Vec::new(),
                plugin_id: "plugin-1".to_string(),
            }],
        })
    }

    fn execute(
        &self,
        _access: &RunnerAccess,
        _action_id: &str,
        _input: &InputValues,
    ) -> Result<ExecutionOutput, RunnerError> {
        Ok(ExecutionOutput::default())
    }

    fn verify_access(&self, _access: &RunnerAccess) -> bool {
        self.accept_access
    }
}

#[derive(Default)]
struct RecordingGateway {
    posts: Mutex<Vec<ChatMessage>>,
    opened: Mutex<Vec<(String, ModalView)>>,
    modal_updates: Mutex<Vec<(String, ModalView)>>,
    homes: Mutex<Vec<(String, HomeView)>>,
}

impl ConversationGateway for RecordingGateway {
    fn post_message(
        &self,
        _channel_id: &ChannelId,
        _thread_ts: Option<&str>,
        message: &ChatMessage,
    ) -> Result<String, GatewayError> {
        self.posts.lock().expect("posts").push(message.clone());
        Ok("1700.1".to_string())
    }

    fn update_message(
        &self,
        _channel_id: &ChannelId,
        _ts: &str,
        _message: &ChatMessage,
    ) -> Result<(), GatewayError> {
        Ok(())
    }

    fn open_modal(&self, trigger_id: &str, view: &ModalView) -> Result<(), GatewayError> {
        self.opened
            .lock()
            .expect("opened")
            .push((trigger_id.to_string(), view.clone()));
        Ok(())
    }

    fn update_modal(&self, view_id: &str, view: &ModalView) -> Result<(), GatewayError> {
        self.modal_updates
            .lock()
            .expect("modal updates")
            .push((view_id.to_string(), view.clone()));
        Ok(())
    }

    fn publish_home_view(&self, user_id: &UserId, view: &HomeView) -> Result<(), GatewayError> {
        self.homes
            .lock()
            .expect("homes")
            .push((user_id.to_string(), view.clone()));
        Ok(())
    }
}

struct FakeProvider {
    gateway: Arc<RecordingGateway>,
    installed: bool,
}

impl GatewayProvider for FakeProvider {
    fn gateway_for(&self, team_id: &TeamId) -> Result<Arc<dyn ConversationGateway>, GatewayError> {
        if !self.installed {
            return Err(GatewayError::NotInstalled(team_id.to_string()));
        }
        Ok(self.gateway.clone())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    log_path: std::path::PathBuf,
    store: Arc<SqliteStore>,
    gateway: Arc<RecordingGateway>,
    dispatcher: Dispatcher,
}

fn harness(accept_access: bool, installed: bool) -> Harness {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("logs/bridge.log");
    let store = Arc::new(SqliteStore::open(&dir.path().join("db/bridge.sqlite3")).expect("store"));
    let gateway = Arc::new(RecordingGateway::default());
    let dispatcher = Dispatcher::new(
        Arc::new(FakeRunner { accept_access }),
        store.clone(),
        Arc::new(FakeProvider {
            gateway: gateway.clone(),
            installed,
        }),
        BridgeLog::new(log_path.clone(), LogLevel::Debug),
    );
    Harness {
        _dir: dir,
        log_path,
        store,
        gateway,
        dispatcher,
    }
}

fn team() -> TeamId {
    TeamId::parse("T1").expect("team")
}

fn user() -> UserId {
    UserId::parse("U1").expect("user")
}

fn submission(url: &str, key: &str) -> InboundEvent {
    InboundEvent::Interaction(InteractionEvent::SubmitConfiguration(
        ConfigurationSubmission {
            team_id: team(),
            user_id: user(),
            view_id: "V1".to_string(),
            form: FormState::default()
                .with_input("runner_url", Some(url))
                .with_input("api_key", Some(key)),
        },
    ))
}

fn message(text: &str) -> InboundEvent {
    InboundEvent::Message(UserMessage {
        team_id: team(),
        channel_id: ChannelId::parse("D1").expect("channel"),
        user_id: user(),
        text: text.to_string(),
        ts: "1700.0".to_string(),
        thread_ts: None,
    })
}

fn all_text(blocks: &[Block]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            Block::Text { text, .. } | Block::Header { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn view_submission_ack_keeps_modal_open_with_verifying_view() {
    let h = harness(true, true);
    assert_eq!(
        h.dispatcher.acknowledge(&submission("https://r", "key-1")),
        Acknowledgement::UpdateView(verifying_modal())
    );
    assert_eq!(
        h.dispatcher.acknowledge(&message("hello")),
        Acknowledgement::Empty
    );
}

#[test]
fn accepted_configuration_is_stored_and_home_refreshed() {
    let h = harness(true, true);
    h.dispatcher
        .handle(submission(" https://runner.example ", "secret-key-123"));

    let stored = h.store.fetch(&team()).expect("fetch").expect("stored");
    assert_eq!(stored.runner_url, "https://runner.example");
    assert_eq!(stored.runner_api_key, "secret-key-123");

    let updates = h.gateway.modal_updates.lock().expect("updates").clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "V1");
    assert!(all_text(&updates[0].1.blocks).contains("connected"));

    let homes = h.gateway.homes.lock().expect("homes").clone();
    assert_eq!(homes.len(), 1);
    assert_eq!(homes[0].0, "U1");
    let home = all_text(&homes[0].1.blocks);
    assert!(home.contains("`https://runner.example`"));
    assert!(home.contains("`secre*********`"));
    assert!(home.contains("*Mail*\n        ⚡ *Send email*"));
}

#[test]
fn rejected_configuration_shows_inline_error_and_stores_nothing() {
    let h = harness(false, true);
    h.dispatcher.handle(submission("https://runner.example", "wrong"));

    assert_eq!(h.store.fetch(&team()).expect("fetch"), None);
    let updates = h.gateway.modal_updates.lock().expect("updates").clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(
        updates[0].1.blocks[0],
        Block::text(format!("🔴 ERROR: {VERIFY_FAILED_MESSAGE}"))
    );
    assert!(h.gateway.homes.lock().expect("homes").is_empty());
}

#[test]
fn configuration_button_opens_modal_prefilled_with_current_url() {
    let h = harness(true, true);
    h.store
        .store(&team(), &RunnerAccess::new("https://old.example", "key-12345"))
        .expect("store");
    h.dispatcher
        .handle(InboundEvent::Interaction(InteractionEvent::OpenConfiguration {
            team_id: team(),
            trigger_id: "trig-1".to_string(),
        }));

    let opened = h.gateway.opened.lock().expect("opened").clone();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0, "trig-1");
    let url_input = opened[0].1.blocks.iter().find_map(|block| match block {
        Block::Input {
            block_id,
            initial_value,
            ..
        } if block_id == "runner_url" => initial_value.clone(),
        _ => None,
    });
    assert_eq!(url_input.as_deref(), Some("https://old.example"));
}

#[test]
fn home_opened_publishes_configuration_required_until_connected() {
    let h = harness(true, true);
    let opened = InboundEvent::HomeOpened(HomeOpened {
        team_id: team(),
        user_id: user(),
    });
    h.dispatcher.handle(opened.clone());
    h.store
        .store(&team(), &RunnerAccess::new("https://runner.example", "key-12345"))
        .expect("store");
    h.dispatcher.handle(opened);

    let homes = h.gateway.homes.lock().expect("homes").clone();
    assert_eq!(homes.len(), 2);
    assert_eq!(homes[0].1.blocks[0], Block::header("Configuration required"));
    assert!(all_text(&homes[1].1.blocks).contains("Available actions"));
}

#[test]
fn spawned_message_handler_replies_on_its_own_thread() {
    let h = harness(true, true);
    h.dispatcher
        .spawn(message("send a report"))
        .join()
        .expect("join handler");
    let posts = h.gateway.posts.lock().expect("posts").clone();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].blocks[0], Block::header("Configuration required"));
}

#[test]
fn handler_failures_are_logged_not_raised() {
    let h = harness(true, false);
    h.dispatcher.handle(message("send a report"));
    let log = fs::read_to_string(&h.log_path).expect("read log");
    let line = log
        .lines()
        .find(|line| line.contains("dispatch.handler.failed"))
        .expect("failure logged");
    let entry: serde_json::Value = serde_json::from_str(line).expect("json line");
    assert_eq!(entry["level"], "error");
    assert!(entry["message"]
        .as_str()
        .unwrap_or_default()
        .contains("message handler for team T1"));
}
