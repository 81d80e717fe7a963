//! Errors surfaced by provisioning operations.

use std::error::Error;

use thiserror::Error;

use crate::assets::AssetError;
use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::gateway::WaitError;
use crate::policy::Cancelled;

/// Fatal failures of a provisioning operation.
///
/// `E` is the provider gateway's error type.
#[derive(Debug, Error)]
pub enum ProvisioningError<E>
where
    E: Error + 'static,
{
    /// Configuration was incomplete; no remote call was made.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The provider was unreachable or rejected a request.
    #[error("provider request failed: {0}")]
    Provider(#[source] E),
    /// No identifier is configured and no running instance exists.
    #[error("no instance identifier is known and no running instance was found")]
    NoInstance,
    /// The instance did not report `running` within the boot poll.
    #[error("start failed: instance {instance_id} not running after {attempts} status checks")]
    StartFailed {
        /// Instance that failed to start.
        instance_id: String,
        /// Number of status checks performed after the start request.
        attempts: u32,
    },
    /// The instance is running but has no public address to connect to.
    #[error("instance {instance_id} has no public address")]
    NoAddress {
        /// Instance without an address.
        instance_id: String,
    },
    /// A bootstrap file could not be copied to the instance.
    #[error(transparent)]
    Transfer(ChannelError),
    /// Bootstrap assets are missing or unreadable.
    #[error(transparent)]
    Asset(#[from] AssetError),
    /// The session was cancelled during a wait.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl<E> From<WaitError<E>> for ProvisioningError<E>
where
    E: Error + 'static,
{
    fn from(value: WaitError<E>) -> Self {
        match value {
            WaitError::Provider(err) => Self::Provider(err),
            WaitError::Cancelled(err) => Self::Cancelled(err),
        }
    }
}
