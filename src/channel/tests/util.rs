//! Tests for channel utility helpers.

use super::super::expand_tilde;
use super::super::util::scp_host;

#[test]
fn expand_tilde_expands_home_prefix() {
    let home = std::env::var("HOME").unwrap_or_else(|err| panic!("HOME should be set: {err}"));
    let expanded = expand_tilde("~/.ssh/deploy.pem");
    assert_eq!(expanded, format!("{home}/.ssh/deploy.pem"));
}

#[test]
fn expand_tilde_leaves_absolute_paths_unchanged() {
    let path = "/absolute/path/to/key";
    assert_eq!(expand_tilde(path), path);
}

#[test]
fn scp_host_leaves_ipv4_and_names_unchanged() {
    assert_eq!(scp_host("198.51.100.7"), "198.51.100.7");
    assert_eq!(scp_host("ec2.example.test"), "ec2.example.test");
}
