use crate::app::cli::parse_args;
use crate::app::command_support::{
    bridge_log, ensure_runtime_root, load_settings, open_store, optional_env, parse_team_id,
    RUNNER_API_KEY_ENV, SLACK_BOT_TOKEN_ENV,
};
use crate::gateway::SlackApiClient;
use crate::interaction::home::fetch_capabilities;
use crate::runner::{ActionRunner, RunnerAccess, RunnerClient};
use crate::shared::TeamId;
use crate::store::{AccessStore, InstallationStore};

const VERIFY_USAGE: &str = "verify <team_id>";
const CONFIGURE_USAGE: &str = "configure <team_id> --url <runner_url> [--key <api_key>] [--skip-verify]";

pub fn cmd_verify(args: &[String]) -> Result<String, String> {
    let parsed = parse_args(args, &[])?;
    let team_id = parse_team_id(parsed.positional.first(), VERIFY_USAGE)?;
    let paths = ensure_runtime_root()?;
    let settings = load_settings(&paths)?;
    let store = open_store(&paths)?;
    let access = store
        .fetch(&team_id)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("workspace {team_id} has no runner access configured"))?;

    let runner = RunnerClient::new(
        settings.runner_request_timeout(),
        bridge_log(&paths, &settings),
    );
    if !runner.verify_access(&access) {
        return Err(format!(
            "runner at {} rejected the stored access for workspace {team_id}",
            access.runner_url
        ));
    }
    let plugins = fetch_capabilities(&runner, &access).map_err(|e| e.to_string())?;
    let actions: usize = plugins.iter().map(|plugin| plugin.actions.len()).sum();
    Ok(format!(
        "verified\nteam_id={team_id}\nrunner_url={}\napi_key={}\nplugins={}\nactions={actions}",
        access.runner_url,
        access.masked_api_key(),
        plugins.len()
    ))
}

pub fn cmd_configure(args: &[String]) -> Result<String, String> {
    let parsed = parse_args(args, &["url", "key"])?;
    let team_id = parse_team_id(parsed.positional.first(), CONFIGURE_USAGE)?;
    let url = parsed
        .option("url")
        .ok_or_else(|| format!("usage: {CONFIGURE_USAGE}"))?;
    let key = parsed
        .option("key")
        .map(str::to_string)
        .or_else(|| optional_env(RUNNER_API_KEY_ENV))
        .ok_or_else(|| format!("missing `--key` and `{RUNNER_API_KEY_ENV}` is not set"))?;
    let access = RunnerAccess::new(url, key);
    if !access.is_complete() {
        return Err(format!("usage: {CONFIGURE_USAGE}"));
    }

    let paths = ensure_runtime_root()?;
    let settings = load_settings(&paths)?;
    let log = bridge_log(&paths, &settings);
    if !parsed.switch("skip-verify") {
        let runner = RunnerClient::new(settings.runner_request_timeout(), log.clone());
        if !runner.verify_access(&access) {
            return Err(crate::interaction::configuration::VERIFY_FAILED_MESSAGE.to_string());
        }
    }

    store_access(&open_store(&paths)?, &team_id, &access)?;
    log.info(
        "configuration.connected",
        &format!(
            "team {team_id} runner {} key {} via cli",
            access.runner_url,
            access.api_key_fingerprint()
        ),
    );
    Ok(format!(
        "configured\nteam_id={team_id}\nrunner_url={}\napi_key={}",
        access.runner_url,
        access.masked_api_key()
    ))
}

fn store_access(
    store: &dyn AccessStore,
    team_id: &TeamId,
    access: &RunnerAccess,
) -> Result<(), String> {
    store.store(team_id, access).map_err(|e| e.to_string())
}

/// Registers a bot token under the team `auth.test` reports for it.
pub fn cmd_install(args: &[String]) -> Result<String, String> {
    let parsed = parse_args(args, &["token"])?;
    let token = parsed
        .option("token")
        .map(str::to_string)
        .or_else(|| optional_env(SLACK_BOT_TOKEN_ENV))
        .ok_or_else(|| format!("missing `--token` and `{SLACK_BOT_TOKEN_ENV}` is not set"))?;

    let paths = ensure_runtime_root()?;
    let settings = load_settings(&paths)?;
    let identity = SlackApiClient::new(settings.slack_api_base(), token.clone())
        .auth_test()
        .map_err(|e| e.to_string())?;
    let team_id = TeamId::parse(&identity.team_id)?;
    let store = open_store(&paths)?;
    store
        .store_installation(&team_id, &token)
        .map_err(|e| e.to_string())?;
    bridge_log(&paths, &settings).info(
        "installation.stored",
        &format!("team {team_id} bot user {}", identity.user_id),
    );
    Ok(format!(
        "installed\nteam_id={team_id}\nteam={}\nbot_user_id={}",
        identity.team, identity.user_id
    ))
}
