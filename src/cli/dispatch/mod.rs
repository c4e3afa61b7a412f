//! Map parsed CLI arguments to the action to execute.

use crate::cli::actions::{promote, server, Action};
use crate::cli::commands::{ARG_LOGIN, ARG_SECRET, CMD_PROMOTE};
use crate::config::Config;
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Build the action selected by `matches`, running the server when no
/// subcommand is given.
///
/// # Errors
/// Returns an error if a required argument is missing.
pub fn handler(matches: &clap::ArgMatches, config: Config) -> Result<Action> {
    match matches.subcommand() {
        Some((CMD_PROMOTE, sub_m)) => {
            let login = sub_m
                .get_one::<String>(ARG_LOGIN)
                .cloned()
                .context("missing required argument: <login>")?;

            Ok(Action::Promote(promote::Args { config, login }))
        }
        _ => {
            let secret = matches
                .get_one::<String>(ARG_SECRET)
                .filter(|secret| !secret.is_empty())
                .cloned()
                .context("missing required argument: --secret (or SECRET)")?;

            Ok(Action::Server(server::Args {
                config,
                secret: SecretString::from(secret),
            }))
        }
    }
}
