//! Bounded retry policies used by the provisioning waits.

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Default number of status polls while waiting for an instance to boot.
pub const DEFAULT_BOOT_POLL_ATTEMPTS: u32 = 40;
/// Default delay between boot status polls, in seconds.
pub const DEFAULT_BOOT_POLL_INTERVAL_SECS: u64 = 10;
/// Default number of status polls after the bootstrap installer runs.
pub const DEFAULT_REBOOT_POLL_ATTEMPTS: u32 = 10;
/// Default delay between post-bootstrap status polls, in seconds.
pub const DEFAULT_REBOOT_POLL_INTERVAL_SECS: u64 = 10;
/// Default settle delay after an instance first reports `running`, in seconds.
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 60;

/// A bounded poll: at most `max_attempts` checks separated by `interval`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Maximum number of checks performed before giving up.
    pub max_attempts: u32,
    /// Delay inserted between two consecutive checks.
    pub interval: Duration,
}

impl PollPolicy {
    /// Builds a poll policy.
    #[must_use]
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

/// Timing knobs for every wait performed by the provisioner.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Poll used while an instance boots after a start request.
    pub boot: PollPolicy,
    /// Poll used while the bootstrap installer may reboot the instance.
    pub reboot: PollPolicy,
    /// Extra wait after the instance first reports `running`.
    pub settle_delay: Duration,
}

impl RetryPolicy {
    /// Replaces the boot poll.
    #[must_use]
    pub const fn with_boot(mut self, boot: PollPolicy) -> Self {
        self.boot = boot;
        self
    }

    /// Replaces the post-bootstrap reboot poll.
    #[must_use]
    pub const fn with_reboot(mut self, reboot: PollPolicy) -> Self {
        self.reboot = reboot;
        self
    }

    /// Replaces the settle delay.
    #[must_use]
    pub const fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            boot: PollPolicy::new(
                DEFAULT_BOOT_POLL_ATTEMPTS,
                Duration::from_secs(DEFAULT_BOOT_POLL_INTERVAL_SECS),
            ),
            reboot: PollPolicy::new(
                DEFAULT_REBOOT_POLL_ATTEMPTS,
                Duration::from_secs(DEFAULT_REBOOT_POLL_INTERVAL_SECS),
            ),
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_DELAY_SECS),
        }
    }
}

/// Raised when a wait is interrupted by its cancellation token.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Sleeps for `duration` unless `cancel` fires first.
///
/// The token is checked before sleeping so an already-cancelled session
/// never starts a new wait.
///
/// # Errors
///
/// Returns [`Cancelled`] when the token is or becomes cancelled.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    tokio::select! {
        () = cancel.cancelled() => Err(Cancelled),
        () = sleep(duration) => Ok(()),
    }
}
