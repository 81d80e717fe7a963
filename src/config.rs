//! Configuration loading via `ortho-config`.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::gateway::LaunchRequest;
use crate::policy::{
    DEFAULT_BOOT_POLL_ATTEMPTS, DEFAULT_BOOT_POLL_INTERVAL_SECS, DEFAULT_REBOOT_POLL_ATTEMPTS,
    DEFAULT_REBOOT_POLL_INTERVAL_SECS, DEFAULT_SETTLE_DELAY_SECS, PollPolicy, RetryPolicy,
};

/// Instance type requested when none is configured.
pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";

/// Directory holding the per-OS bootstrap assets of an installed deployment.
pub const DEFAULT_ASSETS_DIR: &str = "/usr/share/bosun/assets";

/// Local directory used to stage rendered manifests before transfer.
pub const DEFAULT_SCRATCH_DIR: &str = "/tmp";

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

const IMAGE_PREFIX: &str = "ami-";

/// Immutable description of the instance to provision and how to bootstrap
/// it. Values merge defaults, configuration files, environment variables,
/// and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "BOSUN",
    discovery(
        app_name = "bosun",
        env_var = "BOSUN_CONFIG_PATH",
        config_file_name = "bosun.toml",
        dotfile_name = ".bosun.toml",
        project_file_name = "bosun.toml"
    )
)]
pub struct ProvisioningConfig {
    /// Machine image identifier, with or without the `ami-` prefix.
    #[ortho_config(default = String::new())]
    pub image_id: String,
    /// Instance type to launch. Blank values fall back to `t2.micro`.
    #[ortho_config(default = DEFAULT_INSTANCE_TYPE.to_owned())]
    pub instance_type: String,
    /// Name of the key pair injected at launch and used for SSH access.
    #[ortho_config(default = String::new())]
    pub keypair: String,
    /// Security group identifiers, separated by commas or whitespace.
    /// Only required when a new instance has to be created.
    pub security_group: Option<String>,
    /// Existing instance to reuse instead of creating a new one.
    pub instance_id: Option<String>,
    /// Operating system tag selecting the bootstrap assets (for example
    /// `ubuntu`).
    #[ortho_config(default = String::new())]
    pub os_tag: String,
    /// Root of the bootstrap asset tree (`<assets_dir>/<os_tag>/...`).
    #[ortho_config(default = DEFAULT_ASSETS_DIR.to_owned())]
    pub assets_dir: String,
    /// Local directory used to stage the rendered manifest.
    #[ortho_config(default = DEFAULT_SCRATCH_DIR.to_owned())]
    pub scratch_dir: String,
    /// Number of status polls after a start request.
    #[ortho_config(default = DEFAULT_BOOT_POLL_ATTEMPTS)]
    pub boot_poll_attempts: u32,
    /// Seconds between boot status polls.
    #[ortho_config(default = DEFAULT_BOOT_POLL_INTERVAL_SECS)]
    pub boot_poll_interval_secs: u64,
    /// Number of status polls while the bootstrap installer may reboot.
    #[ortho_config(default = DEFAULT_REBOOT_POLL_ATTEMPTS)]
    pub reboot_poll_attempts: u32,
    /// Seconds between post-bootstrap status polls.
    #[ortho_config(default = DEFAULT_REBOOT_POLL_INTERVAL_SECS)]
    pub reboot_poll_interval_secs: u64,
    /// Seconds to wait after an instance first reports `running`.
    #[ortho_config(default = DEFAULT_SETTLE_DELAY_SECS)]
    pub settle_delay_secs: u64,
}

/// Credentials and endpoint settings for the EC2 API. Field names follow
/// the standard `AWS_*` environment variables and share `bosun.toml` with
/// [`ProvisioningConfig`].
#[derive(Clone, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "AWS",
    discovery(
        app_name = "bosun",
        env_var = "BOSUN_CONFIG_PATH",
        config_file_name = "bosun.toml",
        dotfile_name = ".bosun.toml",
        project_file_name = "bosun.toml"
    )
)]
pub struct AwsConfig {
    /// Access key identifier used to sign requests.
    #[ortho_config(default = String::new())]
    pub access_key_id: String,
    /// Secret access key used to derive signing keys.
    #[ortho_config(default = String::new())]
    pub secret_access_key: String,
    /// Optional session token for temporary credentials.
    pub session_token: Option<String>,
    /// Region hosting the instance.
    #[ortho_config(default = DEFAULT_REGION.to_owned())]
    pub region: String,
    /// Endpoint override (for example a LocalStack URL). Defaults to the
    /// public regional endpoint.
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to bosun.toml",
            metadata.description, metadata.env_var, metadata.toml_key
        )));
    }
    Ok(())
}

impl ProvisioningConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("bosun")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks the fields every session needs before any remote call.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the image, key pair, or OS
    /// tag is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.image_id,
            &FieldMetadata::new("machine image", "BOSUN_IMAGE_ID", "image_id"),
        )?;
        require_field(
            &self.keypair,
            &FieldMetadata::new("key pair", "BOSUN_KEYPAIR", "keypair"),
        )?;
        require_field(
            &self.os_tag,
            &FieldMetadata::new("operating system tag", "BOSUN_OS_TAG", "os_tag"),
        )?;
        if self.os_tag.contains('/') || self.os_tag.contains("..") {
            return Err(ConfigError::InvalidValue {
                field: String::from("os_tag"),
                message: String::from("must name a single asset directory"),
            });
        }
        Ok(())
    }

    /// Returns the configured instance type, or `t2.micro` when blank.
    #[must_use]
    pub fn effective_instance_type(&self) -> &str {
        let trimmed = self.instance_type.trim();
        if trimmed.is_empty() {
            DEFAULT_INSTANCE_TYPE
        } else {
            trimmed
        }
    }

    /// Returns the configured instance identifier when it is non-blank.
    #[must_use]
    pub fn configured_instance_id(&self) -> Option<&str> {
        self.instance_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Splits the configured security groups into individual identifiers.
    #[must_use]
    pub fn security_group_ids(&self) -> Vec<String> {
        self.security_group
            .as_deref()
            .unwrap_or_default()
            .split(|ch: char| ch == ',' || ch.is_whitespace())
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Builds the launch parameters for a brand new instance.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field, including
    /// at least one security group, is absent.
    pub fn launch_request(&self) -> Result<LaunchRequest, ConfigError> {
        self.validate()?;
        let security_group_ids = self.security_group_ids();
        if security_group_ids.is_empty() {
            return Err(ConfigError::MissingField(String::from(
                "missing security group: set BOSUN_SECURITY_GROUP or add security_group to \
                 bosun.toml",
            )));
        }

        let image = self.image_id.trim();
        let image_id = if image.starts_with(IMAGE_PREFIX) {
            image.to_owned()
        } else {
            format!("{IMAGE_PREFIX}{image}")
        };

        Ok(LaunchRequest {
            image_id,
            instance_type: self.effective_instance_type().to_owned(),
            keypair: self.keypair.trim().to_owned(),
            security_group_ids,
        })
    }

    /// Builds the retry policy from the configured counts and delays.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            boot: PollPolicy::new(
                self.boot_poll_attempts,
                Duration::from_secs(self.boot_poll_interval_secs),
            ),
            reboot: PollPolicy::new(
                self.reboot_poll_attempts,
                Duration::from_secs(self.reboot_poll_interval_secs),
            ),
            settle_delay: Duration::from_secs(self.settle_delay_secs),
        }
    }

    /// Returns the asset directory for the configured OS tag.
    #[must_use]
    pub fn os_assets_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.assets_dir).join(self.os_tag.trim())
    }
}

impl AwsConfig {
    /// Loads credentials without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("bosun")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a credential or the region
    /// is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_field(
            &self.access_key_id,
            &FieldMetadata::new("AWS access key", "AWS_ACCESS_KEY_ID", "access_key_id"),
        )?;
        require_field(
            &self.secret_access_key,
            &FieldMetadata::new(
                "AWS secret key",
                "AWS_SECRET_ACCESS_KEY",
                "secret_access_key",
            ),
        )?;
        require_field(
            &self.region,
            &FieldMetadata::new("AWS region", "AWS_REGION", "region"),
        )?;
        Ok(())
    }

    /// Returns the endpoint requests are sent to.
    #[must_use]
    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .map_or_else(
                || format!("https://ec2.{}.amazonaws.com/", self.region.trim()),
                str::to_owned,
            )
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds a value that cannot be used.
    #[error("invalid configuration field {field}: {message}")]
    InvalidValue {
        /// Field that failed validation.
        field: String,
        /// Human-readable description of the problem.
        message: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
