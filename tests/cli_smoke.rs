//! Behavioural smoke tests for the CLI entrypoint.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Returns a command isolated from the caller's configuration files and
/// `BOSUN_*` / `AWS_*` environment.
fn isolated_cmd(home: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("bosun");
    for (key, _) in std::env::vars() {
        if key.starts_with("BOSUN_") || key.starts_with("AWS_") || key == "RUST_LOG" {
            cmd.env_remove(key);
        }
    }
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"));
    cmd
}

fn configured_cmd(home: &TempDir, server: &MockServer) -> Command {
    let mut cmd = isolated_cmd(home);
    cmd.env("BOSUN_IMAGE_ID", "ami-42")
        .env("BOSUN_KEYPAIR", "deploy")
        .env("BOSUN_OS_TAG", "ubuntu")
        .env("BOSUN_INSTANCE_ID", "i-abc")
        .env("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE")
        .env("AWS_SECRET_ACCESS_KEY", "secret")
        .env("AWS_REGION", "us-east-1")
        .env("AWS_ENDPOINT", server.uri());
    cmd
}

fn home() -> TempDir {
    TempDir::new().unwrap_or_else(|err| panic!("temp dir: {err}"))
}

fn status_response(state: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!(
        "<DescribeInstanceStatusResponse><instanceStatusSet><item>\
         <instanceId>i-abc</instanceId>\
         <instanceState><name>{state}</name></instanceState>\
         </item></instanceStatusSet></DescribeInstanceStatusResponse>"
    ))
}

#[test]
fn help_lists_the_subcommands() {
    let home = home();
    isolated_cmd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("up")
                .and(predicate::str::contains("down"))
                .and(predicate::str::contains("status")),
        );
}

#[test]
fn missing_subcommand_prints_usage() {
    let home = home();
    isolated_cmd(&home)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn missing_configuration_fails_before_contacting_aws() {
    let home = home();
    isolated_cmd(&home)
        .arg("status")
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains(
            "missing machine image: set BOSUN_IMAGE_ID or add image_id to bosun.toml",
        ));
}

/// Writes `contents` as a configuration file outside the working directory
/// and returns a command pointing `BOSUN_CONFIG_PATH` at it.
fn file_configured_cmd(home: &TempDir, contents: &str) -> Command {
    let dir = home.path().join("etc");
    std::fs::create_dir_all(&dir).unwrap_or_else(|err| panic!("mkdir: {err}"));
    let path = dir.join("bosun.toml");
    std::fs::write(&path, contents).unwrap_or_else(|err| panic!("write config: {err}"));
    let mut cmd = isolated_cmd(home);
    cmd.env("BOSUN_CONFIG_PATH", &path);
    cmd
}

fn config_file(server: &MockServer) -> String {
    format!(
        "image_id = \"ami-42\"\n\
         keypair = \"deploy\"\n\
         os_tag = \"ubuntu\"\n\
         instance_id = \"i-abc\"\n\
         access_key_id = \"AKIDEXAMPLE\"\n\
         secret_access_key = \"secret\"\n\
         region = \"us-east-1\"\n\
         endpoint = \"{}\"\n\
         ssh_user = \"admin\"\n",
        server.uri()
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn status_reads_every_setting_from_the_config_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DescribeInstanceStatus"))
        .and(body_string_contains("InstanceId.1=i-abc"))
        .respond_with(status_response("stopped"))
        .expect(1)
        .mount(&server)
        .await;
    let home = home();

    file_configured_cmd(&home, &config_file(&server))
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout("{\"instance_id\":\"i-abc\",\"status\":\"stopped\"}\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn config_file_without_an_image_reports_how_to_set_it() {
    let server = MockServer::start().await;
    let home = home();
    let contents = config_file(&server).replace("image_id = \"ami-42\"\n", "");

    file_configured_cmd(&home, &contents)
        .arg("status")
        .assert()
        .failure()
        .stdout("")
        .stderr(predicate::str::contains(
            "missing machine image: set BOSUN_IMAGE_ID or add image_id to bosun.toml",
        ));
}

#[tokio::test(flavor = "multi_thread")]
async fn config_file_without_credentials_reports_how_to_set_them() {
    let server = MockServer::start().await;
    let home = home();
    let contents = config_file(&server).replace("access_key_id = \"AKIDEXAMPLE\"\n", "");

    file_configured_cmd(&home, &contents)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "set AWS_ACCESS_KEY_ID or add access_key_id to bosun.toml",
        ));
}

#[tokio::test(flavor = "multi_thread")]
async fn config_file_ssh_settings_are_validated() {
    let server = MockServer::start().await;
    let home = home();
    let contents = config_file(&server).replace("ssh_user = \"admin\"", "ssh_user = \" \"");

    file_configured_cmd(&home, &contents)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "missing ssh_user: set BOSUN_SSH_SSH_USER or add ssh_user to bosun.toml",
        ));
}

#[tokio::test(flavor = "multi_thread")]
async fn status_prints_json_for_the_configured_instance() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DescribeInstanceStatus"))
        .and(body_string_contains("InstanceId.1=i-abc"))
        .respond_with(status_response("running"))
        .expect(1)
        .mount(&server)
        .await;
    let home = home();

    configured_cmd(&home, &server)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout("{\"instance_id\":\"i-abc\",\"status\":\"running\"}\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn down_leaves_a_stopped_instance_alone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DescribeInstanceStatus"))
        .respond_with(status_response("stopped"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=StopInstances"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let home = home();

    configured_cmd(&home, &server)
        .args(["--quiet", "down"])
        .assert()
        .success()
        .stdout("");
}

#[tokio::test(flavor = "multi_thread")]
async fn down_stops_a_running_instance_and_ignores_provider_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DescribeInstanceStatus"))
        .respond_with(status_response("running"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=StopInstances"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    let home = home();

    configured_cmd(&home, &server)
        .args(["--quiet", "down"])
        .assert()
        .success();
}
