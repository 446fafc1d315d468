use crate::app::cli::{help_text, parse_cli_verb, CliVerb};

pub mod daemon;
pub mod workspace;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Setup => daemon::cmd_setup(),
        CliVerb::Start => daemon::cmd_start(),
        CliVerb::Stop => daemon::cmd_stop(),
        CliVerb::Status => daemon::cmd_status(),
        CliVerb::Logs => daemon::cmd_logs(&args[1..]),
        CliVerb::Verify => workspace::cmd_verify(&args[1..]),
        CliVerb::Configure => workspace::cmd_configure(&args[1..]),
        CliVerb::Install => workspace::cmd_install(&args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}
