//! `-v` / `TOKENWARD_LOG_LEVEL`.
//!
//! Each `-v` raises the level by one step. The environment variable takes a
//! level name or the equivalent step count, so `TOKENWARD_LOG_LEVEL=debug`
//! and `-vvv` select the same filter.

use clap::{Arg, ArgAction, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names indexed by verbosity step.
const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Step counts above the last named level are accepted and mean `trace`.
const MAX_VERBOSITY: u8 = 5;

fn parse_verbosity(level: &str) -> Result<u8, String> {
    let level = level.trim();
    if let Ok(step) = level.parse::<u8>() {
        return if step <= MAX_VERBOSITY {
            Ok(step)
        } else {
            Err(format!("verbosity must be at most {MAX_VERBOSITY}"))
        };
    }

    LEVEL_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(level))
        .and_then(|step| u8::try_from(step).ok())
        .ok_or_else(|| format!("unknown log level, expected one of {}", LEVEL_NAMES.join(", ")))
}

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_verbosity)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Raise log verbosity; repeat up to -vvvv (default: error only)")
            .env("TOKENWARD_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
