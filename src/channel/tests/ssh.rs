//! Tests for remote command execution over SSH.

use super::super::*;
use std::ffi::OsString;
use crate::test_support::ScriptedRunner;
use rstest::rstest;

use super::fixtures::{base_config, host};

fn arg_strings(args: &[OsString]) -> Vec<String> {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[rstest]
fn ssh_args_include_port_identity_and_target(base_config: ChannelConfig, host: RemoteHost) {
    let channel = SshChannel::new(base_config, "deploy", ScriptedRunner::new())
        .unwrap_or_else(|err| panic!("config should validate: {err}"));

    let args = arg_strings(&channel.build_ssh_args(&host, "uptime"));

    assert_eq!(
        args,
        vec![
            "-p",
            "2222",
            "-i",
            "/keys/deploy.pem",
            "-o",
            "ConnectTimeout=10",
            "-o",
            "BatchMode=yes",
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "ubuntu@203.0.113.10",
            "uptime",
        ]
    );
}

#[rstest]
fn identity_defaults_to_keypair_pem(base_config: ChannelConfig) {
    let home = std::env::var("HOME").unwrap_or_else(|err| panic!("HOME should be set: {err}"));
    let cfg = ChannelConfig {
        ssh_identity_file: None,
        ..base_config
    };

    let channel = SshChannel::new(cfg, "deploy", ScriptedRunner::new())
        .unwrap_or_else(|err| panic!("config should validate: {err}"));

    assert_eq!(channel.identity_file(), format!("{home}/.ssh/deploy.pem"));
}

#[rstest]
fn strict_host_checking_omits_override(base_config: ChannelConfig, host: RemoteHost) {
    let cfg = ChannelConfig {
        ssh_strict_host_key_checking: true,
        ssh_batch_mode: false,
        ..base_config
    };
    let channel = SshChannel::new(cfg, "deploy", ScriptedRunner::new())
        .unwrap_or_else(|err| panic!("config should validate: {err}"));

    let args = arg_strings(&channel.build_ssh_args(&host, "true"));

    assert!(
        !args.iter().any(|arg| arg.starts_with("StrictHostKeyChecking")),
        "unexpected override: {args:?}"
    );
    assert!(
        !args.iter().any(|arg| arg == "BatchMode=yes"),
        "unexpected batch mode: {args:?}"
    );
}

#[rstest]
fn run_command_returns_non_zero_exit_without_error(base_config: ChannelConfig, host: RemoteHost) {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(3), "partial", "warning: something");
    let channel = SshChannel::new(base_config, "deploy", runner.clone())
        .unwrap_or_else(|err| panic!("config should validate: {err}"));

    let output = channel
        .run_command(&host, "sudo puppet apply puppetfile.pp")
        .unwrap_or_else(|err| panic!("non-zero exit should not error: {err}"));

    assert_eq!(output.exit_code, Some(3));
    assert_eq!(output.combined(), "partial\nwarning: something");
    let invocations = runner.invocations();
    let invocation = invocations
        .first()
        .unwrap_or_else(|| panic!("ssh should have been invoked"));
    assert_eq!(invocation.program, "ssh");
    assert!(
        invocation
            .command_string()
            .ends_with("ubuntu@203.0.113.10 sudo puppet apply puppetfile.pp"),
        "unexpected command: {}",
        invocation.command_string()
    );
}

#[rstest]
fn run_command_reports_connection_failure(base_config: ChannelConfig, host: RemoteHost) {
    let runner = ScriptedRunner::new();
    runner.push_output(Some(255), "", "ssh: connect to host 203.0.113.10: timed out\n");
    let channel = SshChannel::new(base_config, "deploy", runner)
        .unwrap_or_else(|err| panic!("config should validate: {err}"));

    let err = channel
        .run_command(&host, "uptime")
        .expect_err("connection failure should error");

    assert_eq!(
        err,
        ChannelError::Execution {
            host: String::from("203.0.113.10"),
            message: String::from("ssh: connect to host 203.0.113.10: timed out"),
        }
    );
}

#[rstest]
fn run_command_maps_spawn_failure_to_execution(base_config: ChannelConfig, host: RemoteHost) {
    let channel = SshChannel::new(base_config, "deploy", ScriptedRunner::new())
        .unwrap_or_else(|err| panic!("config should validate: {err}"));

    let err = channel
        .run_command(&host, "uptime")
        .expect_err("missing scripted response should error");

    assert!(
        matches!(err, ChannelError::Execution { .. }),
        "unexpected error: {err}"
    );
}

#[rstest]
fn new_rejects_blank_ssh_user(base_config: ChannelConfig) {
    let cfg = ChannelConfig {
        ssh_user: String::from("  "),
        ..base_config
    };

    let err = SshChannel::new(cfg, "deploy", ScriptedRunner::new())
        .expect_err("blank user should be rejected");

    assert_eq!(
        err.to_string(),
        "missing ssh_user: set BOSUN_SSH_SSH_USER or add ssh_user to bosun.toml"
    );
}

#[rstest]
fn new_requires_identity_or_keypair(base_config: ChannelConfig) {
    let cfg = ChannelConfig {
        ssh_identity_file: None,
        ..base_config
    };

    let err = SshChannel::new(cfg, " ", ScriptedRunner::new())
        .expect_err("no identity should be rejected");

    assert_eq!(
        err,
        ChannelError::InvalidConfig {
            field: String::from("ssh_identity_file"),
        }
    );
}
