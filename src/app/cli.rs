#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Setup,
    Start,
    Stop,
    Status,
    Logs,
    Verify,
    Configure,
    Install,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "setup" => CliVerb::Setup,
        "start" => CliVerb::Start,
        "stop" => CliVerb::Stop,
        "status" => CliVerb::Status,
        "logs" => CliVerb::Logs,
        "verify" => CliVerb::Verify,
        "configure" => CliVerb::Configure,
        "install" => CliVerb::Install,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  setup                                Initialize state root, config and database"
            .to_string(),
        "  start                                Run the Socket Mode bridge in the foreground"
            .to_string(),
        "  stop                                 Ask the running bridge to stop".to_string(),
        "  status                               Show ownership and socket health".to_string(),
        "  logs [count]                         Print the most recent bridge log lines".to_string(),
        "  verify <team_id>                     Check the stored runner access for a workspace"
            .to_string(),
        "  configure <team_id> --url <url> [--key <key>] [--skip-verify]".to_string(),
        "                                       Store runner access for a workspace".to_string(),
        "  install [--token <bot_token>]        Register a workspace bot token".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}

/// Splits `--flag value` pairs and bare `--switch`es from positional args.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    pub positional: Vec<String>,
    pub options: Vec<(String, String)>,
    pub switches: Vec<String>,
}

impl ParsedArgs {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn switch(&self, name: &str) -> bool {
        self.switches.iter().any(|key| key == name)
    }
}

pub fn parse_args(args: &[String], value_flags: &[&str]) -> Result<ParsedArgs, String> {
    let mut parsed = ParsedArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let Some(flag) = arg.strip_prefix("--") else {
            parsed.positional.push(arg.clone());
            continue;
        };
        if value_flags.contains(&flag) {
            let value = iter
                .next()
                .ok_or_else(|| format!("missing value for `--{flag}`"))?;
            parsed.options.push((flag.to_string(), value.clone()));
        } else {
            parsed.switches.push(flag.to_string());
        }
    }
    Ok(parsed)
}
