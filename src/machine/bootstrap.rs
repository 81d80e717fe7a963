//! Environment bootstrap: installs the configuration-management tool and
//! applies the machine manifest.

use std::borrow::Cow;

use camino::Utf8Path;
use shell_escape::unix::escape;
use tracing::{debug, info, warn};

use super::{OpResult, Provisioner, ProvisioningError};
use crate::assets::{BootstrapAssets, REMOTE_INSTALLER_PATH, REMOTE_MANIFEST_PATH};
use crate::channel::{RemoteChannel, RemoteHost};
use crate::gateway::{InstanceStatus, ProviderGateway};
use crate::policy::{Cancelled, pause};

/// Command that runs the installer from the login home with elevated
/// privilege, then removes it.
#[must_use]
pub fn install_command() -> String {
    let installer = escape(Cow::Borrowed(REMOTE_INSTALLER_PATH));
    format!("cd; sudo chmod u+x {installer}; sudo ./{installer}; rm {installer};")
}

/// Command that applies the manifest from the login home, then removes it.
#[must_use]
pub fn apply_command() -> String {
    let manifest = escape(Cow::Borrowed(REMOTE_MANIFEST_PATH));
    format!("cd; sudo puppet apply {manifest}; rm {manifest};")
}

impl<G, C> Provisioner<G, C>
where
    G: ProviderGateway,
    C: RemoteChannel,
{
    /// Installs the configuration-management tool and applies the manifest
    /// selected by the configured OS tag.
    ///
    /// The instance is made reachable first if it is not already. Remote
    /// command failures and non-zero exits are logged and do not abort the
    /// bootstrap; failed file transfers do. The operation may be repeated.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Asset`] when the assets are missing,
    /// [`ProvisioningError::Transfer`] when a file cannot be copied,
    /// [`ProvisioningError::NoAddress`] when the instance has no public
    /// address, and any error of [`Provisioner::ensure_reachable`].
    pub async fn bootstrap_environment(&mut self) -> OpResult<(), G> {
        let address = self.ensure_reachable().await?;
        let instance_id = self.state.instance_id().to_owned();
        if address.is_empty() {
            return Err(ProvisioningError::NoAddress { instance_id });
        }
        let assets = BootstrapAssets::locate(&self.config.os_assets_dir())?;
        let host = self.channel.host_for(&address);

        info!(
            instance_id = %instance_id,
            os_tag = %self.config.os_tag,
            "installing configuration management"
        );
        self.channel
            .send_file(&host, assets.installer(), REMOTE_INSTALLER_PATH)
            .map_err(ProvisioningError::Transfer)?;
        self.run_logged(&host, &install_command());

        self.await_reboot(&instance_id).await?;

        info!(instance_id = %instance_id, "applying manifest");
        let staged = assets.stage_manifest(Utf8Path::new(&self.config.scratch_dir))?;
        self.channel
            .send_file(&host, staged.path(), REMOTE_MANIFEST_PATH)
            .map_err(ProvisioningError::Transfer)?;
        self.run_logged(&host, &apply_command());
        drop(staged);

        self.state.mark_bootstrapped();
        info!(instance_id = %instance_id, "environment bootstrapped");
        Ok(())
    }

    /// Waits for the instance to report `running` again after the installer,
    /// which may reboot it. Exhausting the poll is logged, not fatal, and
    /// status query failures count as "not yet back".
    async fn await_reboot(&self, instance_id: &str) -> Result<(), Cancelled> {
        let poll = self.policy.reboot;
        for attempt in 1..=poll.max_attempts {
            pause(poll.interval, &self.cancel).await?;
            match self.gateway.describe_status(instance_id).await {
                Ok(InstanceStatus::Running) => {
                    debug!(instance_id, attempt, "instance running after installer");
                    return Ok(());
                }
                Ok(status) => debug!(instance_id, attempt, %status, "waiting for instance"),
                Err(err) => debug!(instance_id, attempt, error = %err, "status check failed"),
            }
        }
        warn!(
            instance_id,
            attempts = poll.max_attempts,
            "instance did not report running after the installer, continuing"
        );
        Ok(())
    }

    fn run_logged(&self, host: &RemoteHost, command: &str) {
        match self.channel.run_command(host, command) {
            Ok(output) => {
                if self.verbosity.shows_output() {
                    debug!(command, output = %output.combined(), "remote command output");
                }
                if !output.is_success() {
                    warn!(
                        command,
                        exit_code = ?output.exit_code,
                        stderr = %output.stderr.trim(),
                        "remote command exited unsuccessfully"
                    );
                }
            }
            Err(err) => warn!(command, error = %err, "remote command failed"),
        }
    }
}
