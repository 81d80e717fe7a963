//! Shared provisioning configuration fixture for integration tests.
//!
//! Integration tests are compiled as separate crates (one per top-level file in
//! `tests/`). Placing shared fixtures under `tests/common/` avoids creating an
//! additional integration test binary while still allowing reuse via:
//!
//! ```rust
//! #[path = "common/provisioning_config.rs"]
//! mod provisioning_config;
//! ```

use bosun::ProvisioningConfig;
use bosun::config::{DEFAULT_ASSETS_DIR, DEFAULT_INSTANCE_TYPE, DEFAULT_SCRATCH_DIR};

/// A configuration that passes validation and can launch an instance.
pub fn provisioning_config() -> ProvisioningConfig {
    ProvisioningConfig {
        image_id: String::from("ami-0abcdef1234567890"),
        instance_type: String::from(DEFAULT_INSTANCE_TYPE),
        keypair: String::from("deploy"),
        security_group: Some(String::from("sg-0123456789abcdef0")),
        instance_id: None,
        os_tag: String::from("ubuntu"),
        assets_dir: String::from(DEFAULT_ASSETS_DIR),
        scratch_dir: String::from(DEFAULT_SCRATCH_DIR),
        boot_poll_attempts: 40,
        boot_poll_interval_secs: 10,
        reboot_poll_attempts: 10,
        reboot_poll_interval_secs: 10,
        settle_delay_secs: 60,
    }
}
