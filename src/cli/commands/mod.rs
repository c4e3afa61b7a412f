pub mod logging;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_CONFIG: &str = "config";
pub const ARG_SECRET: &str = "secret";
pub const CMD_PROMOTE: &str = "promote";
pub const ARG_LOGIN: &str = "login";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("sso")
        .about("Single sign-on service")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_CONFIG)
                .short('c')
                .long("config")
                .help("Path to the YAML configuration file")
                .env("CONFIG_PATH")
                .global(true),
        )
        .arg(
            Arg::new(ARG_SECRET)
                .long("secret")
                .help("Symmetric key used to sign bearer tokens")
                .env("SECRET")
                .hide_env_values(true),
        )
        .subcommand(
            Command::new(CMD_PROMOTE)
                .about("Grant the admin role to an existing user")
                .arg(
                    Arg::new(ARG_LOGIN)
                        .help("Login of the user to promote")
                        .required(true),
                ),
        );

    logging::with_args(command)
}
