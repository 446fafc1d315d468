use crate::app::command_support::{
    bridge_log, ensure_runtime_root, load_settings, open_store, SLACK_APP_TOKEN_ENV,
};
use crate::config::{required_env, save_settings, Settings};
use crate::dispatch::Dispatcher;
use crate::gateway::socket::SocketRunner;
use crate::gateway::{SlackApiClient, SlackGatewayProvider};
use crate::runner::RunnerClient;
use crate::runtime::{
    claim_ownership, load_socket_health, ownership_state, release_ownership, signal_stop,
    spawn_stop_watcher, OwnershipState, RuntimeError, StatePaths,
};
use crate::shared::BridgeLog;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_LOG_LINES: usize = 20;

pub fn cmd_setup() -> Result<String, String> {
    let paths = ensure_runtime_root()?;
    let settings_path = paths.settings_file();
    let wrote_settings = if settings_path.exists() {
        load_settings(&paths)?;
        false
    } else {
        save_settings(&paths, &Settings::default()).map_err(|e| e.to_string())?;
        true
    };
    let store = open_store(&paths)?;
    Ok(format!(
        "setup complete\nstate_root={}\nconfig={}{}\ndatabase={}",
        paths.root.display(),
        settings_path.display(),
        if wrote_settings { " (created)" } else { "" },
        store.path().display()
    ))
}

/// Runs in the foreground until `stop` is issued or the socket fails for
/// good.
pub fn cmd_start() -> Result<String, String> {
    let paths = ensure_runtime_root()?;
    let settings = load_settings(&paths)?;
    let app_token = required_env(SLACK_APP_TOKEN_ENV).map_err(|e| e.to_string())?;
    let log = bridge_log(&paths, &settings);

    match ownership_state(&paths).map_err(|e| e.to_string())? {
        OwnershipState::Running { pid } => return Err(format!("bridge already running (pid={pid})")),
        OwnershipState::Stale => log.warn("bridge.start.stale_pid", "replacing stale pid file"),
        OwnershipState::NotRunning => {}
    }
    claim_ownership(&paths).map_err(|e| e.to_string())?;
    log.info(
        "bridge.start",
        &format!("pid={} state_root={}", std::process::id(), paths.root.display()),
    );

    let result = run_bridge(&paths, &settings, &log, app_token);
    release_ownership(&paths);
    match &result {
        Ok(_) => log.info("bridge.stop", "bridge stopped"),
        Err(err) => log.error("bridge.stop", err),
    }
    result
}

fn run_bridge(
    paths: &StatePaths,
    settings: &Settings,
    log: &BridgeLog,
    app_token: String,
) -> Result<String, String> {
    let store = Arc::new(open_store(paths)?);
    let runner = Arc::new(RunnerClient::new(
        settings.runner_request_timeout(),
        log.clone(),
    ));
    let api_base = settings.slack_api_base();
    let gateways = Arc::new(SlackGatewayProvider::new(api_base.clone(), store.clone()));
    let dispatcher = Dispatcher::new(runner, store, gateways, log.clone());
    let app_api = SlackApiClient::new(api_base, app_token);

    let stop = Arc::new(AtomicBool::new(false));
    let watcher = spawn_stop_watcher(paths.clone(), Arc::clone(&stop));
    let result = SocketRunner {
        app_api: &app_api,
        dispatcher: &dispatcher,
        paths,
        reconnect_backoff: Duration::from_millis(settings.slack.socket_reconnect_backoff_ms),
        log,
    }
    .run(&stop);
    stop.store(true, Ordering::Relaxed);
    let _ = watcher.join();

    result.map_err(|e| e.to_string())?;
    Ok(format!("stopped\nstate_root={}", paths.root.display()))
}

pub fn cmd_stop() -> Result<String, String> {
    let paths = ensure_runtime_root()?;
    match signal_stop(&paths) {
        Ok(()) => Ok("stop requested".to_string()),
        Err(RuntimeError::NotRunning) => Ok("stopped\nrunning=false".to_string()),
        Err(err) => Err(err.to_string()),
    }
}

pub fn cmd_status() -> Result<String, String> {
    let paths = ensure_runtime_root()?;
    let mut lines = Vec::new();
    match ownership_state(&paths).map_err(|e| e.to_string())? {
        OwnershipState::Running { pid } => {
            lines.push("ownership=running".to_string());
            lines.push(format!("pid={pid}"));
        }
        OwnershipState::Stale => lines.push("ownership=stale".to_string()),
        OwnershipState::NotRunning => lines.push("ownership=not_running".to_string()),
    }

    let health = load_socket_health(&paths);
    lines.push(format!("socket.connected={}", health.connected));
    lines.push(format!(
        "socket.envelopes_acknowledged={}",
        health.envelopes_acknowledged
    ));
    if let Some(at) = health.last_envelope_at {
        lines.push(format!("socket.last_envelope_at={at}"));
    }
    if let Some(at) = health.last_reconnect {
        lines.push(format!("socket.last_reconnect={at}"));
    }
    if let Some(err) = health.last_error {
        lines.push(format!("socket.last_error={err}"));
    }

    let store = open_store(&paths)?;
    let teams = store.list_teams().map_err(|e| e.to_string())?;
    lines.push(format!("workspaces={}", teams.len()));
    Ok(lines.join("\n"))
}

pub fn cmd_logs(args: &[String]) -> Result<String, String> {
    let count = match args.first() {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| format!("invalid line count `{raw}`"))?,
        None => DEFAULT_LOG_LINES,
    };
    let paths = ensure_runtime_root()?;
    let path = paths.log_path();
    if !path.exists() {
        return Ok("no logs".to_string());
    }
    let raw =
        fs::read_to_string(&path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let mut recent = raw.lines().rev().take(count).collect::<Vec<_>>();
    if recent.is_empty() {
        return Ok("no logs".to_string());
    }
    recent.reverse();
    Ok(recent.join("\n"))
}
