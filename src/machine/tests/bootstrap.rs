//! `bootstrap_environment` tests.

use std::time::Duration;

use rstest::rstest;
use tokio::time::Instant;

use super::fixtures::{AssetTree, INSTALLER_BODY, MANIFEST_BODY, config, provisioner, with_instance};
use crate::channel::{ChannelError, DEFAULT_SSH_PORT, RemoteHost, RemoteOutput};
use crate::config::ProvisioningConfig;
use crate::gateway::InstanceStatus;
use crate::machine::{ProvisioningError, Stage, apply_command, install_command};
use crate::test_support::GatewayOp;

const ADDRESS: &str = "203.0.113.9";

#[test]
fn commands_run_from_the_login_home() {
    assert_eq!(
        install_command(),
        "cd; sudo chmod u+x install-puppet.sh; sudo ./install-puppet.sh; rm install-puppet.sh;"
    );
    assert_eq!(
        apply_command(),
        "cd; sudo puppet apply puppetfile.pp; rm puppetfile.pp;"
    );
}

fn ready_config(config: ProvisioningConfig, tree: &AssetTree) -> ProvisioningConfig {
    tree.apply(with_instance(config, "i-1"))
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn installs_then_applies_the_manifest(config: ProvisioningConfig) {
    let tree = AssetTree::new();
    let (mut machine, gateway, channel) = provisioner(ready_config(config, &tree));
    gateway.script_status("i-1", &[InstanceStatus::Running]);
    gateway.set_public_address("i-1", ADDRESS);

    machine
        .bootstrap_environment()
        .await
        .unwrap_or_else(|err| panic!("bootstrap should succeed: {err}"));

    let host = RemoteHost {
        address: String::from(ADDRESS),
        port: DEFAULT_SSH_PORT,
    };
    let sent = channel.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|file| file.host == host));
    assert_eq!(sent.first().map(|file| file.remote_path.as_str()), Some("install-puppet.sh"));
    assert_eq!(sent.first().map(|file| file.contents.as_str()), Some(INSTALLER_BODY));
    assert_eq!(sent.get(1).map(|file| file.remote_path.as_str()), Some("puppetfile.pp"));
    assert_eq!(sent.get(1).map(|file| file.contents.as_str()), Some(MANIFEST_BODY));

    let commands: Vec<String> = channel
        .commands()
        .into_iter()
        .map(|ran| ran.command)
        .collect();
    assert_eq!(commands, vec![install_command(), apply_command()]);
    assert_eq!(machine.stage(), Stage::Bootstrapped);
    assert_eq!(tree.scratch_entries(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn reboot_poll_exhaustion_does_not_fail(config: ProvisioningConfig) {
    let tree = AssetTree::new();
    let (mut machine, gateway, channel) = provisioner(ready_config(config, &tree));
    gateway.script_status("i-1", &[InstanceStatus::Running, InstanceStatus::Stopped]);
    gateway.set_public_address("i-1", ADDRESS);
    let begin = Instant::now();

    machine
        .bootstrap_environment()
        .await
        .unwrap_or_else(|err| panic!("exhaustion is tolerated: {err}"));

    assert_eq!(gateway.count(GatewayOp::DescribeStatus), 1 + 10);
    assert_eq!(begin.elapsed(), Duration::from_secs(100));
    assert_eq!(channel.commands().len(), 2);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn reboot_poll_stops_once_running_again(config: ProvisioningConfig) {
    let tree = AssetTree::new();
    let (mut machine, gateway, _channel) = provisioner(ready_config(config, &tree));
    gateway.script_status(
        "i-1",
        &[
            InstanceStatus::Running,
            InstanceStatus::Stopped,
            InstanceStatus::Pending,
            InstanceStatus::Running,
        ],
    );
    gateway.set_public_address("i-1", ADDRESS);
    let begin = Instant::now();

    machine
        .bootstrap_environment()
        .await
        .unwrap_or_else(|err| panic!("bootstrap should succeed: {err}"));

    assert_eq!(begin.elapsed(), Duration::from_secs(30));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn reboot_poll_tolerates_status_failures(config: ProvisioningConfig) {
    let tree = AssetTree::new();
    let (mut machine, gateway, channel) = provisioner(ready_config(config, &tree));
    gateway.script_status("i-1", &[InstanceStatus::Running]);
    gateway.set_public_address("i-1", ADDRESS);
    machine
        .ensure_reachable()
        .await
        .unwrap_or_else(|err| panic!("reachable: {err}"));
    gateway.fail(GatewayOp::DescribeStatus);

    machine
        .bootstrap_environment()
        .await
        .unwrap_or_else(|err| panic!("status failures are tolerated: {err}"));

    assert_eq!(channel.sent().len(), 2);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn command_failures_are_logged_not_raised(config: ProvisioningConfig) {
    let tree = AssetTree::new();
    let (mut machine, gateway, channel) = provisioner(ready_config(config, &tree));
    gateway.script_status("i-1", &[InstanceStatus::Running]);
    gateway.set_public_address("i-1", ADDRESS);
    channel.push_command_result(Err(ChannelError::Execution {
        host: String::from(ADDRESS),
        message: String::from("connection reset"),
    }));
    channel.push_command_result(Ok(RemoteOutput {
        exit_code: Some(1),
        stdout: String::new(),
        stderr: String::from("Error: could not apply"),
    }));

    machine
        .bootstrap_environment()
        .await
        .unwrap_or_else(|err| panic!("command failures are tolerated: {err}"));

    assert_eq!(channel.commands().len(), 2);
    assert_eq!(machine.stage(), Stage::Bootstrapped);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn transfer_failures_abort(config: ProvisioningConfig) {
    let tree = AssetTree::new();
    let (mut machine, gateway, channel) = provisioner(ready_config(config, &tree));
    gateway.script_status("i-1", &[InstanceStatus::Running]);
    gateway.set_public_address("i-1", ADDRESS);
    channel.fail_transfers();

    let result = machine.bootstrap_environment().await;

    assert!(
        matches!(result, Err(ProvisioningError::Transfer(_))),
        "unexpected result: {result:?}"
    );
    assert!(channel.commands().is_empty());
    assert_eq!(machine.stage(), Stage::Reachable);
    assert_eq!(tree.scratch_entries(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn missing_assets_abort_before_any_transfer(config: ProvisioningConfig) {
    let tree = AssetTree::new();
    let mut unknown_os = ready_config(config, &tree);
    unknown_os.os_tag = String::from("haiku");
    let (mut machine, gateway, channel) = provisioner(unknown_os);
    gateway.script_status("i-1", &[InstanceStatus::Running]);
    gateway.set_public_address("i-1", ADDRESS);

    let result = machine.bootstrap_environment().await;

    assert!(
        matches!(result, Err(ProvisioningError::Asset(_))),
        "unexpected result: {result:?}"
    );
    assert!(channel.sent().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn missing_address_is_an_error(config: ProvisioningConfig) {
    let tree = AssetTree::new();
    let (mut machine, gateway, channel) = provisioner(ready_config(config, &tree));
    gateway.script_status("i-1", &[InstanceStatus::Running]);

    let result = machine.bootstrap_environment().await;

    assert!(
        matches!(result, Err(ProvisioningError::NoAddress { .. })),
        "unexpected result: {result:?}"
    );
    assert!(channel.sent().is_empty());
}
