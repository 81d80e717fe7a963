//! Core library for the `bosun` provisioning tool.
//!
//! The crate drives one EC2 instance through its lifecycle: create or reuse
//! it, start it and wait until it is reachable, bootstrap it with a
//! configuration-management manifest over SSH, and stop it again. Provider
//! and remote access are abstracted behind [`ProviderGateway`] and
//! [`RemoteChannel`] so the [`Provisioner`] can be exercised without a cloud
//! account.

pub mod assets;
pub mod channel;
pub mod config;
pub mod ec2;
pub mod gateway;
pub mod machine;
pub mod policy;
pub mod telemetry;
pub mod test_support;

pub use assets::{AssetError, BootstrapAssets};
pub use channel::{
    ChannelConfig, ChannelConfigLoadError, ChannelError, ProcessCommandRunner, RemoteChannel,
    RemoteHost, RemoteOutput, SshChannel,
};
pub use config::{AwsConfig, ConfigError, ProvisioningConfig};
pub use ec2::{Ec2Gateway, Ec2GatewayError};
pub use gateway::{InstanceStatus, LaunchRequest, ProviderGateway};
pub use machine::{Provisioner, ProvisioningError, RunState, Stage};
pub use policy::{Cancelled, PollPolicy, RetryPolicy};
pub use telemetry::Verbosity;
