//! Command-line interface definitions for the `bosun` binary.
//!
//! The clap structures live here on their own so the build script can reuse
//! them to render the manual page.

use clap::{Args, Parser, Subcommand};

/// Top-level CLI for the `bosun` binary.
#[derive(Debug, Parser)]
#[command(
    name = "bosun",
    version,
    about = "Provision, bootstrap and stop a single EC2 instance",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Log poll attempts and captured remote output.
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,
    /// Only log warnings and errors. Takes precedence over `--verbose`.
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,
    /// Operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// `bosun` subcommands.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Create or reuse the instance, start it and bootstrap it.
    #[command(name = "up")]
    Up(UpCommand),
    /// Stop the configured instance if it is running.
    #[command(name = "down")]
    Down,
    /// Print the status of the configured instance.
    #[command(name = "status")]
    Status(StatusCommand),
}

/// Arguments for `bosun up`.
#[derive(Debug, Args)]
pub(crate) struct UpCommand {
    /// Stop once the instance is reachable, without installing anything.
    #[arg(long)]
    pub(crate) skip_bootstrap: bool,
    /// Stop the instance again at the end of the session.
    #[arg(long)]
    pub(crate) destroy: bool,
}

/// Arguments for `bosun status`.
#[derive(Debug, Args)]
pub(crate) struct StatusCommand {
    /// Print the status as a JSON object.
    #[arg(long)]
    pub(crate) json: bool,
}
