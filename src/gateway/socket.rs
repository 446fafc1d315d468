use super::api::SlackApiClient;
use super::events::{parse_frame, SocketFrame};
use super::GatewayError;
use crate::dispatch::{Acknowledgement, Dispatcher};
use crate::runtime::{load_socket_health, save_socket_health, SocketHealth, StatePaths};
use crate::shared::{now_secs, BridgeLog};
use serde_json::json;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};

const SOCKET_IDLE_SLEEP: Duration = Duration::from_millis(40);

type SlackSocket = WebSocket<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryClass {
    Retryable,
    NonRetryable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionOutcome {
    Disconnected,
    StopRequested,
}

/// Socket Mode ingest until `stop` is raised. Every envelope is acknowledged
/// before its handler thread starts. Auth failures end the loop with an
/// error; anything else reconnects after a jittered backoff.
pub struct SocketRunner<'a> {
    pub app_api: &'a SlackApiClient,
    pub dispatcher: &'a Dispatcher,
    pub paths: &'a StatePaths,
    pub reconnect_backoff: Duration,
    pub log: &'a BridgeLog,
}

impl SocketRunner<'_> {
    pub fn run(&self, stop: &AtomicBool) -> Result<(), GatewayError> {
        let mut health = load_socket_health(self.paths);
        let mut handlers = Vec::new();
        let result = self.run_connections(stop, &mut health, &mut handlers);

        health.connected = false;
        self.save_health(&health);
        for handle in handlers {
            let _ = handle.join();
        }
        result
    }

    fn run_connections(
        &self,
        stop: &AtomicBool,
        health: &mut SocketHealth,
        handlers: &mut Vec<JoinHandle<()>>,
    ) -> Result<(), GatewayError> {
        while !stop.load(Ordering::Relaxed) {
            health.last_reconnect = Some(now_secs());
            let url = match self.app_api.open_socket_connection() {
                Ok(url) => url,
                Err(GatewayError::RateLimited {
                    retry_after_secs, ..
                }) => {
                    self.record_failure(health, "socket url rate limited", "429", RetryClass::Retryable);
                    let wait = Duration::from_secs(retry_after_secs).max(self.reconnect_backoff);
                    if !sleep_reconnect(wait, stop) {
                        break;
                    }
                    continue;
                }
                Err(err) => {
                    let class = classify_socket_failure(&err.to_string());
                    let message = self.record_failure(health, "socket url open failed", &err.to_string(), class);
                    if class == RetryClass::NonRetryable {
                        return Err(GatewayError::ApiRequest(message));
                    }
                    if !sleep_reconnect(self.reconnect_backoff, stop) {
                        break;
                    }
                    continue;
                }
            };

            let mut socket = match connect(url.as_str()) {
                Ok((socket, _)) => socket,
                Err(err) => {
                    let class = classify_socket_failure(&err.to_string());
                    let message = self.record_failure(health, "socket connect failed", &err.to_string(), class);
                    if class == RetryClass::NonRetryable {
                        return Err(GatewayError::ApiRequest(message));
                    }
                    if !sleep_reconnect(self.reconnect_backoff, stop) {
                        break;
                    }
                    continue;
                }
            };
            set_socket_nonblocking(&mut socket)?;
            health.connected = true;
            health.last_error = None;
            self.save_health(health);
            self.log.info("socket.connected", "socket mode connection established");

            let outcome = self.process_connection(&mut socket, stop, health, handlers);
            let _ = socket.close(None);
            health.connected = false;
            self.save_health(health);

            match outcome {
                ConnectionOutcome::StopRequested => break,
                ConnectionOutcome::Disconnected => {
                    if !sleep_reconnect(self.reconnect_backoff, stop) {
                        break;
                    }
                }
            }
        }
        self.log.info("socket.stopped", "socket mode loop stopped");
        Ok(())
    }

    fn process_connection(
        &self,
        socket: &mut SlackSocket,
        stop: &AtomicBool,
        health: &mut SocketHealth,
        handlers: &mut Vec<JoinHandle<()>>,
    ) -> ConnectionOutcome {
        loop {
            if stop.load(Ordering::Relaxed) {
                return ConnectionOutcome::StopRequested;
            }
            handlers.retain(|handle| !handle.is_finished());

            match socket.read() {
                Ok(Message::Text(text)) => {
                    if self.handle_text(socket, text.as_str(), health, handlers) {
                        return ConnectionOutcome::Disconnected;
                    }
                }
                Ok(Message::Ping(payload)) => {
                    let _ = socket.send(Message::Pong(payload));
                }
                Ok(Message::Close(_)) => return ConnectionOutcome::Disconnected,
                Ok(_) => {}
                Err(tungstenite::Error::Io(err))
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    thread::sleep(SOCKET_IDLE_SLEEP);
                }
                Err(tungstenite::Error::ConnectionClosed) => {
                    return ConnectionOutcome::Disconnected
                }
                Err(err) => {
                    let class = classify_socket_failure(&err.to_string());
                    self.record_failure(health, "socket read failed", &err.to_string(), class);
                    return ConnectionOutcome::Disconnected;
                }
            }
        }
    }

    /// Returns true when Slack asked the client to reconnect.
    fn handle_text(
        &self,
        socket: &mut SlackSocket,
        text: &str,
        health: &mut SocketHealth,
        handlers: &mut Vec<JoinHandle<()>>,
    ) -> bool {
        let frame = match parse_frame(text) {
            Ok(frame) => frame,
            Err(err) => {
                self.log
                    .warn("socket.frame.invalid", &format!("unparseable frame: {err}"));
                return false;
            }
        };
        match frame {
            SocketFrame::Hello => {
                self.log.debug("socket.hello", "received hello");
                false
            }
            SocketFrame::Disconnect { reason } => {
                self.log
                    .info("socket.disconnect", &format!("slack requested reconnect: {reason}"));
                true
            }
            SocketFrame::Envelope { envelope_id, event } => {
                let ack = match &event {
                    Some(event) => self.dispatcher.acknowledge(event),
                    None => Acknowledgement::Empty,
                };
                if let Err(err) = socket.send(Message::Text(ack_frame(&envelope_id, &ack))) {
                    self.log.warn(
                        "socket.ack.failed",
                        &format!("envelope {envelope_id}: {err}"),
                    );
                }
                health.envelopes_acknowledged += 1;
                health.last_envelope_at = Some(now_secs());
                self.save_health(health);
                if let Some(event) = event {
                    handlers.push(self.dispatcher.spawn(event));
                }
                false
            }
            SocketFrame::Other => false,
        }
    }

    fn record_failure(
        &self,
        health: &mut SocketHealth,
        context: &str,
        detail: &str,
        class: RetryClass,
    ) -> String {
        let message = format_socket_error(context, detail, class);
        self.log.warn("socket.failure", &message);
        health.connected = false;
        health.last_error = Some(message.clone());
        self.save_health(health);
        message
    }

    fn save_health(&self, health: &SocketHealth) {
        if let Err(err) = save_socket_health(self.paths, health) {
            self.log.warn("socket.health.write_failed", &err.to_string());
        }
    }
}

pub fn ack_frame(envelope_id: &str, ack: &Acknowledgement) -> String {
    match ack {
        Acknowledgement::Empty => json!({ "envelope_id": envelope_id }),
        Acknowledgement::UpdateView(view) => json!({
            "envelope_id": envelope_id,
            "payload": {
                "response_action": "update",
                "view": view.to_slack_json(),
            },
        }),
    }
    .to_string()
}

fn sleep_reconnect(backoff: Duration, stop: &AtomicBool) -> bool {
    let mut remaining = backoff + reconnect_jitter(backoff);
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let step = remaining.min(Duration::from_millis(25));
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    !stop.load(Ordering::Relaxed)
}

fn reconnect_jitter(backoff: Duration) -> Duration {
    let ceiling = backoff.min(Duration::from_millis(500)).as_millis() as u64;
    if ceiling == 0 {
        return Duration::ZERO;
    }
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_nanos() as u64)
        .unwrap_or(0);
    Duration::from_millis(seed % (ceiling + 1))
}

fn classify_socket_failure(message: &str) -> RetryClass {
    let lower = message.to_ascii_lowercase();
    if [
        "invalid_auth",
        "not_authed",
        "token_revoked",
        "account_inactive",
        "missing_scope",
        "not_allowed_token_type",
        "403",
        "401",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
    {
        RetryClass::NonRetryable
    } else {
        RetryClass::Retryable
    }
}

fn format_socket_error(context: &str, detail: &str, class: RetryClass) -> String {
    let class = match class {
        RetryClass::Retryable => "retryable",
        RetryClass::NonRetryable => "non_retryable",
    };
    format!("{context} ({class}): {detail}")
}

fn set_socket_nonblocking(socket: &mut SlackSocket) -> Result<(), GatewayError> {
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_nonblocking(true),
        MaybeTlsStream::Rustls(stream) => stream.sock.set_nonblocking(true),
        _ => Ok(()),
    }
    .map_err(|err| GatewayError::ApiRequest(format!("failed to configure socket mode stream: {err}")))
}
