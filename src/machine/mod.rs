//! Provisioning state machine.
//!
//! A [`Provisioner`] drives one instance from "unknown" to running,
//! reachable and bootstrapped, and can stop it again. Each operation checks
//! the provider before acting so repeating it within a session never
//! duplicates work, and every wait is bounded by the [`RetryPolicy`].

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::channel::RemoteChannel;
use crate::config::{ConfigError, ProvisioningConfig};
use crate::gateway::{self, InstanceStatus, ProviderGateway};
use crate::policy::{RetryPolicy, pause};
use crate::telemetry::Verbosity;

mod bootstrap;
mod error;
mod state;

pub use bootstrap::{apply_command, install_command};
pub use error::ProvisioningError;
pub use state::{RunState, Stage};

type OpResult<T, G> = Result<T, ProvisioningError<<G as ProviderGateway>::Error>>;

/// Drives a single instance through its lifecycle for one session.
pub struct Provisioner<G, C>
where
    G: ProviderGateway,
    C: RemoteChannel,
{
    config: ProvisioningConfig,
    gateway: G,
    channel: C,
    policy: RetryPolicy,
    verbosity: Verbosity,
    cancel: CancellationToken,
    state: RunState,
}

impl<G, C> Provisioner<G, C>
where
    G: ProviderGateway,
    C: RemoteChannel,
{
    /// Builds a provisioner after validating `config`.
    ///
    /// The retry policy comes from the configuration and the verbosity
    /// defaults to [`Verbosity::Info`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required field is missing. No remote
    /// call is made in that case.
    pub fn new(config: ProvisioningConfig, gateway: G, channel: C) -> Result<Self, ConfigError> {
        config.validate()?;
        let policy = config.retry_policy();
        Ok(Self {
            config,
            gateway,
            channel,
            policy,
            verbosity: Verbosity::default(),
            cancel: CancellationToken::new(),
            state: RunState::default(),
        })
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets how much remote output is logged.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Uses `cancel` to interrupt waits.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Configuration the session was built from.
    #[must_use]
    pub const fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Session memory.
    #[must_use]
    pub const fn state(&self) -> &RunState {
        &self.state
    }

    /// Furthest stage reached by this session.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    /// Retry policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn known_instance_id(&self) -> String {
        if self.state.instance_id().is_empty() {
            self.config
                .configured_instance_id()
                .unwrap_or_default()
                .to_owned()
        } else {
            self.state.instance_id().to_owned()
        }
    }

    async fn describe(&self, instance_id: &str) -> OpResult<InstanceStatus, G> {
        self.gateway
            .describe_status(instance_id)
            .await
            .map_err(ProvisioningError::Provider)
    }

    /// Makes sure a usable instance exists and returns its identifier.
    ///
    /// A configured or previously resolved identifier is adopted when its
    /// instance is neither absent nor terminated. Otherwise exactly one
    /// instance is launched. Once the session knows an identifier, further
    /// calls return it without contacting the provider.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Config`] when creation is needed but no
    /// security group is configured, and [`ProvisioningError::Provider`] when
    /// a provider call fails.
    pub async fn ensure_created(&mut self) -> OpResult<String, G> {
        if !self.state.instance_id().is_empty() {
            return Ok(self.state.instance_id().to_owned());
        }

        let candidate = self.known_instance_id();
        info!(instance_id = %candidate, "checking for a usable instance");
        let status = self.describe(&candidate).await?;
        if status.is_usable() {
            info!(instance_id = %candidate, %status, "reusing existing instance");
            return Ok(self.state.adopt(&candidate).to_owned());
        }

        let request = self.config.launch_request()?;
        info!(
            image_id = %request.image_id,
            instance_type = %request.instance_type,
            %status,
            "creating instance"
        );
        let instance_id = self
            .gateway
            .create(&request)
            .await
            .map_err(ProvisioningError::Provider)?;
        self.state.mark_created(&instance_id);
        info!(instance_id = %self.state.instance_id(), "instance created");
        Ok(self.state.instance_id().to_owned())
    }

    async fn resolve_instance_id(&mut self) -> OpResult<String, G> {
        let mut instance_id = self.known_instance_id();
        if instance_id.is_empty() {
            info!("no instance identifier known, looking for a running instance");
            instance_id = self
                .gateway
                .first_running_instance_id()
                .await
                .map_err(ProvisioningError::Provider)?
                .trim()
                .to_owned();
        }
        if instance_id.is_empty() {
            return Err(ProvisioningError::NoInstance);
        }
        Ok(self.state.adopt(&instance_id).to_owned())
    }

    /// Makes sure the instance is running and returns its public address.
    ///
    /// A stopped instance is started and polled with the boot policy; after
    /// it reaches `running` the settle delay elapses before the address is
    /// fetched. Repeated calls return the recorded address.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::StartFailed`] when the boot poll is
    /// exhausted, [`ProvisioningError::NoInstance`] when no instance can be
    /// resolved, [`ProvisioningError::Cancelled`] when a wait is interrupted
    /// and [`ProvisioningError::Provider`] when a provider call fails.
    pub async fn ensure_reachable(&mut self) -> OpResult<String, G> {
        if self.state.instance_ready() {
            return Ok(self.state.public_address().to_owned());
        }

        let instance_id = self.resolve_instance_id().await?;
        info!(instance_id = %instance_id, "checking instance status");
        let status = self.describe(&instance_id).await?;
        if status != InstanceStatus::Running {
            let boot = self.policy.boot;
            let started = gateway::start(&self.gateway, &instance_id, boot, &self.cancel).await?;
            if !started {
                return Err(ProvisioningError::StartFailed {
                    instance_id,
                    attempts: boot.max_attempts,
                });
            }
            info!(
                instance_id = %instance_id,
                delay_secs = self.policy.settle_delay.as_secs(),
                "instance running, waiting for it to settle"
            );
            pause(self.policy.settle_delay, &self.cancel).await?;
        }

        let address = self
            .gateway
            .public_address(&instance_id)
            .await
            .map_err(ProvisioningError::Provider)?;
        self.state.mark_ready(&address);
        info!(
            instance_id = %instance_id,
            address = %self.state.public_address(),
            "instance reachable"
        );
        Ok(self.state.public_address().to_owned())
    }

    /// Post-bootstrap verification hook. No checks are defined yet.
    pub fn run_tests(&self) {
        info!(
            instance_id = %self.state.instance_id(),
            "no post-bootstrap checks configured"
        );
    }

    /// Reports the classified status of the known or configured instance.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Provider`] when the status query fails.
    pub async fn status(&self) -> OpResult<InstanceStatus, G> {
        self.describe(&self.known_instance_id()).await
    }

    /// Stops the instance if it is running.
    ///
    /// Never fails: provider errors are logged and teardown carries on. The
    /// first-running lookup is not consulted, so a session without a known
    /// or configured identifier stops nothing.
    pub async fn destroy(&mut self) {
        let instance_id = self.known_instance_id();
        if instance_id.is_empty() {
            info!("no instance known, nothing to stop");
        } else {
            info!(instance_id = %instance_id, "stopping instance");
            match gateway::stop(&self.gateway, &instance_id).await {
                Ok(()) => info!(instance_id = %instance_id, "instance stopped"),
                Err(err) => warn!(
                    instance_id = %instance_id,
                    error = %err,
                    "failed to stop instance, continuing teardown"
                ),
            }
        }
        self.state.mark_destroyed();
    }
}

#[cfg(test)]
mod tests;
