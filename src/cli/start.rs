use crate::cli::{actions::Action, commands, dispatch, telemetry};
use crate::config::{Config, Env};
use anyhow::{Context, Result};
use clap::parser::ValueSource;

/// Map verbosity count to tracing level
const fn get_verbosity_level(verbosity: u8) -> tracing::Level {
    match verbosity {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

/// Log level used when neither `-v` nor `SSO_LOG_LEVEL` is given
const fn default_level(env: Env) -> tracing::Level {
    match env {
        Env::Local => tracing::Level::DEBUG,
        Env::Prod => tracing::Level::INFO,
    }
}

fn verbosity(matches: &clap::ArgMatches) -> Option<tracing::Level> {
    match matches.value_source(commands::logging::ARG_VERBOSITY) {
        Some(ValueSource::CommandLine | ValueSource::EnvVariable) => matches
            .get_one::<u8>(commands::logging::ARG_VERBOSITY)
            .copied()
            .map(get_verbosity_level),
        _ => None,
    }
}

/// Main entry point for the CLI - builds and returns the Action
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, telemetry
/// initialization fails, or the arguments do not form a valid action
pub fn start() -> Result<Action> {
    // 1. Parse command-line arguments
    let matches = commands::new().get_matches();

    // 2. Load the configuration file
    let path = matches
        .get_one::<String>(commands::ARG_CONFIG)
        .context("missing required argument: --config (or CONFIG_PATH)")?;
    let config = Config::load(path).with_context(|| format!("Failed to load config: {path}"))?;

    // 3. Initialize telemetry
    let level = verbosity(&matches).unwrap_or_else(|| default_level(config.env));
    telemetry::init(level, config.env == Env::Prod)?;

    // 4. Dispatch to appropriate action
    dispatch::handler(&matches, config)
}
