//! Verbosity selection and tracing subscriber installation.

use std::fmt;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt as fmt_layer;
use tracing_subscriber::prelude::*;

/// How much progress output the provisioner emits.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum Verbosity {
    /// Warnings and errors only.
    Quiet,
    /// Progress for every transition.
    #[default]
    Info,
    /// Progress plus poll attempts and captured remote output.
    Debug,
}

impl Verbosity {
    /// Picks a verbosity from the CLI's `--quiet` / `--verbose` switches.
    ///
    /// `--quiet` wins when both are set.
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, true) => Self::Debug,
            (false, false) => Self::Info,
        }
    }

    /// Returns `true` when captured remote output should be logged.
    #[must_use]
    pub const fn shows_output(self) -> bool {
        matches!(self, Self::Debug)
    }

    /// Tracing level directive for this verbosity.
    #[must_use]
    pub const fn level(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Default filter directive when `RUST_LOG` is unset.
    #[must_use]
    pub fn directive(self) -> String {
        format!("bosun={}", self.level())
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.level())
    }
}

/// Installs the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `verbosity`. Returns `false` when a
/// subscriber was already installed.
#[must_use]
pub fn init(verbosity: Verbosity) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt_layer::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .is_ok()
}
