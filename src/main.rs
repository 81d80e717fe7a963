//! Binary entry point for the `bosun` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use bosun::{
    AwsConfig, ChannelConfig, ChannelError, ConfigError, Ec2Gateway, Ec2GatewayError,
    InstanceStatus, ProcessCommandRunner, Provisioner, ProvisioningConfig, ProvisioningError,
    SshChannel, Verbosity, telemetry,
};

mod cli;

use cli::{Cli, Command, StatusCommand, UpCommand};

/// Exit status used when the session is interrupted.
const INTERRUPTED_EXIT_CODE: i32 = 130;

type Machine = Provisioner<Ec2Gateway, SshChannel<ProcessCommandRunner>>;

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("ssh configuration error: {0}")]
    ChannelConfig(String),
    #[error("ssh setup failed: {0}")]
    Channel(#[from] ChannelError),
    #[error("provider setup failed: {0}")]
    Gateway(#[from] Ec2GatewayError),
    #[error("provisioning failed: {0}")]
    Provisioning(#[from] ProvisioningError<Ec2GatewayError>),
    #[error("failed to write output: {0}")]
    Output(String),
}

impl CliError {
    const fn exit_code(&self) -> i32 {
        match self {
            Self::Provisioning(ProvisioningError::Cancelled(_)) => INTERRUPTED_EXIT_CODE,
            _ => 1,
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    instance_id: &'a str,
    status: &'a str,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);
    let _fresh_subscriber = telemetry::init(verbosity);

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let exit_code = match dispatch(cli.command, verbosity, cancel).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    drop(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    }));
}

async fn dispatch(
    command: Command,
    verbosity: Verbosity,
    cancel: CancellationToken,
) -> Result<(), CliError> {
    match command {
        Command::Up(args) => up(&args, build_machine(verbosity, cancel)?).await,
        Command::Down => {
            build_machine(verbosity, cancel)?.destroy().await;
            Ok(())
        }
        Command::Status(args) => status(&args, build_machine(verbosity, cancel)?).await,
    }
}

fn build_machine(verbosity: Verbosity, cancel: CancellationToken) -> Result<Machine, CliError> {
    let config = ProvisioningConfig::load_without_cli_args()?;
    config.validate()?;
    let gateway = Ec2Gateway::new(AwsConfig::load_without_cli_args()?)?;
    let channel_config = ChannelConfig::load_without_cli_args()
        .map_err(|err| CliError::ChannelConfig(err.to_string()))?;
    let channel = SshChannel::with_process_runner(channel_config, &config.keypair)?;
    Ok(Provisioner::new(config, gateway, channel)?
        .with_verbosity(verbosity)
        .with_cancellation(cancel))
}

async fn up(args: &UpCommand, mut machine: Machine) -> Result<(), CliError> {
    let instance_id = machine.ensure_created().await?;
    let address = machine.ensure_reachable().await?;
    if args.skip_bootstrap {
        info!(instance_id = %instance_id, "skipping bootstrap");
    } else {
        machine.bootstrap_environment().await?;
    }
    machine.run_tests();
    if args.destroy {
        machine.destroy().await;
    }
    writeln!(io::stdout(), "{instance_id}\t{address}")
        .map_err(|err| CliError::Output(err.to_string()))
}

async fn status(args: &StatusCommand, machine: Machine) -> Result<(), CliError> {
    let current = machine.status().await?;
    let instance_id = machine
        .config()
        .configured_instance_id()
        .unwrap_or_default();
    let rendered = render_status(instance_id, current, args.json)?;
    writeln!(io::stdout(), "{rendered}").map_err(|err| CliError::Output(err.to_string()))
}

fn render_status(
    instance_id: &str,
    status: InstanceStatus,
    json: bool,
) -> Result<String, CliError> {
    let report = StatusReport {
        instance_id,
        status: status.as_str(),
    };
    if json {
        serde_json::to_string(&report).map_err(|err| CliError::Output(err.to_string()))
    } else if instance_id.is_empty() {
        Ok(format!("-\t{}", report.status))
    } else {
        Ok(format!("{instance_id}\t{}", report.status))
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
