//! SSH channel configuration and errors.
//!
//! [`ChannelConfig`] is loaded via `ortho-config`, merging defaults,
//! configuration files, and environment variables.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default remote login for the supported images.
pub const DEFAULT_SSH_USER: &str = "ubuntu";

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Transfer and remote execution settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "BOSUN_SSH",
    discovery(
        app_name = "bosun",
        env_var = "BOSUN_CONFIG_PATH",
        config_file_name = "bosun.toml",
        dotfile_name = ".bosun.toml",
        project_file_name = "bosun.toml"
    )
)]
pub struct ChannelConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = DEFAULT_SSH_USER.to_owned())]
    pub ssh_user: String,
    /// Remote SSH port.
    #[ortho_config(default = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking; disabled by default because
    /// instance addresses change between sessions.
    #[ortho_config(default = false)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null`.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub ssh_known_hosts_file: String,
    /// Private key used for authentication. Supports tilde expansion. When
    /// unset, `~/.ssh/<keypair>.pem` is used.
    pub ssh_identity_file: Option<String>,
    /// Seconds allowed for the TCP connection before ssh gives up.
    #[ortho_config(default = 10)]
    pub connect_timeout_secs: u32,
}

/// Errors raised when loading the channel configuration from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ChannelConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("ssh configuration parsing failed: {0}")]
    Parse(String),
}

impl ChannelConfig {
    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidConfig`] when any required field is
    /// empty.
    pub fn validate(&self) -> Result<(), ChannelError> {
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.scp_bin, "scp_bin")?;
        Self::require_value(&self.ssh_user, "ssh_user")?;
        Self::require_optional_value(self.ssh_identity_file.as_deref(), "ssh_identity_file")?;
        if self.ssh_port == 0 {
            return Err(ChannelError::InvalidConfig {
                field: String::from("ssh_port"),
            });
        }
        Ok(())
    }

    /// Loads configuration using defaults, configuration files, and
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ChannelConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("bosun")])
            .map_err(|err| ChannelConfigLoadError::Parse(err.to_string()))
    }

    fn require_optional_value(value: Option<&str>, field: &str) -> Result<(), ChannelError> {
        match value {
            None => Ok(()),
            Some(v) if !v.trim().is_empty() => Ok(()),
            Some(_) => Err(ChannelError::InvalidConfig {
                field: field.to_owned(),
            }),
        }
    }

    fn require_value(value: &str, field: &str) -> Result<(), ChannelError> {
        Self::require_optional_value(Some(value), field)
    }
}

/// Errors surfaced while transferring files or running remote commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ChannelError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}: set BOSUN_SSH_{env_suffix} or add {field} to bosun.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a file cannot be copied to the instance.
    #[error("failed to transfer {local_path} to {remote_path}: {message}")]
    Transfer {
        /// Local file being sent.
        local_path: Utf8PathBuf,
        /// Destination on the instance.
        remote_path: String,
        /// Captured diagnostic output.
        message: String,
    },
    /// Raised when the remote command cannot be executed at all, for
    /// example because the connection failed.
    #[error("failed to execute remote command on {host}: {message}")]
    Execution {
        /// Address of the instance.
        host: String,
        /// Captured diagnostic output.
        message: String,
    },
}
