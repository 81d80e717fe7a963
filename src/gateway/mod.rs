//! Provider gateway abstraction for a single compute instance.
//!
//! The trait exposes the raw provider primitives. The bounded helpers
//! [`start`] and [`stop`] layer the idempotency guards and boot poll on top
//! so every implementation shares the same waiting behaviour.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::policy::{Cancelled, PollPolicy, pause};

/// Normalised view of the provider's raw instance state.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InstanceStatus {
    /// No status record exists for the instance.
    Absent,
    /// The instance has been terminated or is shutting down for good.
    Terminated,
    /// The instance is booting.
    Pending,
    /// The instance is running.
    Running,
    /// The instance is stopped and may be started again.
    Stopped,
    /// Any other non-empty state string.
    Unknown,
}

impl InstanceStatus {
    /// Classifies a raw provider state string. Surrounding whitespace is
    /// ignored.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        match raw.trim() {
            "" => Self::Absent,
            "terminated" | "shutting-down" => Self::Terminated,
            "running" => Self::Running,
            "pending" => Self::Pending,
            "stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    /// Returns `true` when the instance can be adopted instead of creating a
    /// new one.
    #[must_use]
    pub const fn is_usable(self) -> bool {
        !matches!(self, Self::Absent | Self::Terminated)
    }

    /// Returns a stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Terminated => "terminated",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters used to launch exactly one new instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchRequest {
    /// Fully qualified machine image identifier (`ami-...`).
    pub image_id: String,
    /// Instance type, for example `t2.micro`.
    pub instance_type: String,
    /// Key pair injected into the instance.
    pub keypair: String,
    /// Security groups attached to the instance.
    pub security_group_ids: Vec<String>,
}

/// Future returned by gateway operations.
pub type GatewayFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud providers.
///
/// Every operation may fail with the provider's error type when the API is
/// unreachable or rejects the request. A missing instance is not an error:
/// it is reported as [`InstanceStatus::Absent`].
pub trait ProviderGateway {
    /// Provider specific error type returned by the gateway.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the classified status of `instance_id`.
    fn describe_status<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> GatewayFuture<'a, InstanceStatus, Self::Error>;

    /// Launches one new instance and returns its identifier. Not idempotent.
    fn create<'a>(&'a self, request: &'a LaunchRequest) -> GatewayFuture<'a, String, Self::Error>;

    /// Issues a start request without waiting for it to take effect.
    fn request_start<'a>(&'a self, instance_id: &'a str) -> GatewayFuture<'a, (), Self::Error>;

    /// Issues a stop request without waiting for it to take effect.
    fn request_stop<'a>(&'a self, instance_id: &'a str) -> GatewayFuture<'a, (), Self::Error>;

    /// Returns the public address, or an empty string when none is assigned.
    fn public_address<'a>(&'a self, instance_id: &'a str)
    -> GatewayFuture<'a, String, Self::Error>;

    /// Returns the identifier of the first running instance, or an empty
    /// string when none is running.
    fn first_running_instance_id(&self) -> GatewayFuture<'_, String, Self::Error>;
}

/// Errors raised by the bounded gateway waits.
#[derive(Debug, Error)]
pub enum WaitError<E>
where
    E: std::error::Error + 'static,
{
    /// The provider rejected a request or was unreachable.
    #[error(transparent)]
    Provider(E),
    /// The caller cancelled the wait.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

/// Starts `instance_id` unless it already runs, then polls until it reports
/// `running`.
///
/// Each poll attempt waits `poll.interval` before checking the status, for
/// at most `poll.max_attempts` checks. Exhausting the poll is reported as
/// `Ok(false)` rather than an error.
///
/// # Errors
///
/// Returns [`WaitError::Provider`] when a provider call fails and
/// [`WaitError::Cancelled`] when `cancel` fires.
pub async fn start<G: ProviderGateway>(
    gateway: &G,
    instance_id: &str,
    poll: PollPolicy,
    cancel: &CancellationToken,
) -> Result<bool, WaitError<G::Error>> {
    let current = gateway
        .describe_status(instance_id)
        .await
        .map_err(WaitError::Provider)?;
    if current == InstanceStatus::Running {
        return Ok(true);
    }

    info!(instance_id, status = %current, "starting instance");
    gateway
        .request_start(instance_id)
        .await
        .map_err(WaitError::Provider)?;

    for attempt in 1..=poll.max_attempts {
        pause(poll.interval, cancel).await?;
        let status = gateway
            .describe_status(instance_id)
            .await
            .map_err(WaitError::Provider)?;
        if status == InstanceStatus::Running {
            return Ok(true);
        }
        debug!(instance_id, attempt, %status, "instance is not yet running, waiting");
    }

    Ok(false)
}

/// Stops `instance_id` when it is running; any other state is a no-op.
///
/// # Errors
///
/// Returns the provider error when the status query or stop request fails.
pub async fn stop<G: ProviderGateway>(gateway: &G, instance_id: &str) -> Result<(), G::Error> {
    let status = gateway.describe_status(instance_id).await?;
    if status != InstanceStatus::Running {
        debug!(instance_id, %status, "instance is not running, nothing to stop");
        return Ok(());
    }
    gateway.request_stop(instance_id).await
}
