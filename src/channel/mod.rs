//! Remote access channel: copies files to the instance and runs commands
//! on it over the system `scp` and `ssh` clients.

use std::ffi::OsString;

use camino::Utf8Path;

mod config;
mod types;
mod util;

pub use config::{
    ChannelConfig, ChannelConfigLoadError, ChannelError, DEFAULT_SSH_PORT, DEFAULT_SSH_USER,
};
pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner, RemoteHost, RemoteOutput};
pub use util::expand_tilde;

/// Exit status reported by `ssh` itself when the connection fails.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Transfers files to an instance and executes commands on it.
pub trait RemoteChannel {
    /// Copies `local_path` to `remote_path` on `host`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Transfer`] when the file cannot be copied, for
    /// example because the instance is unreachable.
    fn send_file(
        &self,
        host: &RemoteHost,
        local_path: &Utf8Path,
        remote_path: &str,
    ) -> Result<(), ChannelError>;

    /// Executes `command` on `host` and returns its captured output.
    ///
    /// A non-zero remote exit status is not an error; callers inspect
    /// [`RemoteOutput::exit_code`].
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Execution`] when the command cannot be run at
    /// all.
    fn run_command(&self, host: &RemoteHost, command: &str) -> Result<RemoteOutput, ChannelError>;

    /// Builds the [`RemoteHost`] used to reach `address`.
    fn host_for(&self, address: &str) -> RemoteHost {
        RemoteHost {
            address: address.to_owned(),
            port: DEFAULT_SSH_PORT,
        }
    }
}

/// [`RemoteChannel`] backed by the OpenSSH client tools.
#[derive(Clone, Debug)]
pub struct SshChannel<R: CommandRunner> {
    config: ChannelConfig,
    identity_file: String,
    runner: R,
}

impl SshChannel<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidConfig`] when validation fails.
    pub fn with_process_runner(config: ChannelConfig, keypair: &str) -> Result<Self, ChannelError> {
        Self::new(config, keypair, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshChannel<R> {
    /// Creates a channel authenticating with the configured identity file,
    /// or `~/.ssh/<keypair>.pem` when none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidConfig`] when configuration validation
    /// fails or no identity can be derived.
    pub fn new(config: ChannelConfig, keypair: &str, runner: R) -> Result<Self, ChannelError> {
        config.validate()?;
        let identity = match config.ssh_identity_file.as_deref() {
            Some(path) => path.trim().to_owned(),
            None if !keypair.trim().is_empty() => format!("~/.ssh/{}.pem", keypair.trim()),
            None => {
                return Err(ChannelError::InvalidConfig {
                    field: String::from("ssh_identity_file"),
                });
            }
        };
        Ok(Self {
            identity_file: expand_tilde(&identity),
            config,
            runner,
        })
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Returns the identity file passed to `ssh` and `scp`.
    #[must_use]
    pub fn identity_file(&self) -> &str {
        &self.identity_file
    }

    fn build_scp_args(
        &self,
        host: &RemoteHost,
        local_path: &Utf8Path,
        remote_path: &str,
    ) -> Vec<OsString> {
        let mut args = vec![OsString::from("-P"), OsString::from(host.port.to_string())];
        args.extend(self.common_options());
        args.push(OsString::from(local_path.as_str()));
        args.push(OsString::from(format!(
            "{}@{}:{remote_path}",
            self.config.ssh_user,
            util::scp_host(&host.address)
        )));
        args
    }

    fn build_ssh_args(&self, host: &RemoteHost, command: &str) -> Vec<OsString> {
        let mut args = vec![OsString::from("-p"), OsString::from(host.port.to_string())];
        args.extend(self.common_options());
        args.push(OsString::from(format!(
            "{}@{}",
            self.config.ssh_user, host.address
        )));
        args.push(OsString::from(command));
        args
    }

    fn common_options(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-i"),
            OsString::from(&self.identity_file),
            OsString::from("-o"),
            OsString::from(format!(
                "ConnectTimeout={}",
                self.config.connect_timeout_secs
            )),
        ];

        if self.config.ssh_batch_mode {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.ssh_strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.ssh_known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.ssh_known_hosts_file
            )));
        }

        args
    }
}

impl<R: CommandRunner> RemoteChannel for SshChannel<R> {
    fn host_for(&self, address: &str) -> RemoteHost {
        RemoteHost {
            address: address.to_owned(),
            port: self.config.ssh_port,
        }
    }

    fn send_file(
        &self,
        host: &RemoteHost,
        local_path: &Utf8Path,
        remote_path: &str,
    ) -> Result<(), ChannelError> {
        let transfer_error = |message: String| ChannelError::Transfer {
            local_path: local_path.to_path_buf(),
            remote_path: remote_path.to_owned(),
            message,
        };

        let args = self.build_scp_args(host, local_path, remote_path);
        let output = self
            .runner
            .run(&self.config.scp_bin, &args)
            .map_err(|err| transfer_error(err.to_string()))?;
        if output.is_success() {
            return Ok(());
        }

        Err(transfer_error(format!(
            "{} exited with status {}: {}",
            self.config.scp_bin,
            output.status_text(),
            output.stderr.trim()
        )))
    }

    fn run_command(&self, host: &RemoteHost, command: &str) -> Result<RemoteOutput, ChannelError> {
        let args = self.build_ssh_args(host, command);
        let output = self
            .runner
            .run(&self.config.ssh_bin, &args)
            .map_err(|err| ChannelError::Execution {
                host: host.address.clone(),
                message: err.to_string(),
            })?;

        if output.code == Some(SSH_CONNECTION_FAILURE) {
            return Err(ChannelError::Execution {
                host: host.address.clone(),
                message: output.stderr.trim().to_owned(),
            });
        }

        Ok(RemoteOutput {
            exit_code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests;
