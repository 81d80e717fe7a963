//! Session memory for one provisioning run.

use std::fmt;

/// Lifecycle stage reached by a provisioning session.
///
/// Stages only move forward; a new session is required to start over.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Stage {
    /// No instance identifier is known yet.
    NoInstance,
    /// An instance was created or adopted.
    Created,
    /// The instance is running and its address is known.
    Reachable,
    /// Bootstrap assets were installed and applied.
    Bootstrapped,
    /// The instance was stopped.
    Destroyed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoInstance => "no-instance",
            Self::Created => "created",
            Self::Reachable => "reachable",
            Self::Bootstrapped => "bootstrapped",
            Self::Destroyed => "destroyed",
        };
        f.write_str(label)
    }
}

/// Mutable record of what the session has done so far.
///
/// Every flag flips to `true` at most once and the instance identifier,
/// once set, is never replaced.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunState {
    created: bool,
    instance_ready: bool,
    bootstrapped: bool,
    destroyed: bool,
    instance_id: String,
    public_address: String,
}

impl RunState {
    /// Returns `true` when this session launched the instance.
    #[must_use]
    pub const fn created(&self) -> bool {
        self.created
    }

    /// Returns `true` once the instance is running with a known address.
    #[must_use]
    pub const fn instance_ready(&self) -> bool {
        self.instance_ready
    }

    /// Returns `true` once the environment has been bootstrapped.
    #[must_use]
    pub const fn bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Returns `true` once the instance has been torn down.
    #[must_use]
    pub const fn destroyed(&self) -> bool {
        self.destroyed
    }

    /// Identifier every remote call of the session targets; empty until known.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Public address recorded by the reachability check; possibly empty.
    #[must_use]
    pub fn public_address(&self) -> &str {
        &self.public_address
    }

    /// Furthest stage reached.
    #[must_use]
    pub fn stage(&self) -> Stage {
        if self.destroyed {
            Stage::Destroyed
        } else if self.bootstrapped {
            Stage::Bootstrapped
        } else if self.instance_ready {
            Stage::Reachable
        } else if self.instance_id.is_empty() {
            Stage::NoInstance
        } else {
            Stage::Created
        }
    }

    /// Records `instance_id` unless an identifier is already known and
    /// returns the identifier in effect.
    pub(crate) fn adopt(&mut self, instance_id: &str) -> &str {
        if self.instance_id.is_empty() {
            instance_id.trim().clone_into(&mut self.instance_id);
        }
        &self.instance_id
    }

    pub(crate) fn mark_created(&mut self, instance_id: &str) {
        self.adopt(instance_id);
        self.created = true;
    }

    pub(crate) fn mark_ready(&mut self, public_address: &str) {
        if !self.instance_ready {
            public_address.trim().clone_into(&mut self.public_address);
            self.instance_ready = true;
        }
    }

    pub(crate) const fn mark_bootstrapped(&mut self) {
        self.bootstrapped = true;
    }

    pub(crate) const fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }
}
