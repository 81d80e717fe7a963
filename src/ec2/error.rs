//! Error type for the EC2 gateway.

use thiserror::Error;

use crate::config::ConfigError;

/// Error code EC2 returns for identifiers it does not know.
pub(crate) const NOT_FOUND_CODE: &str = "InvalidInstanceID.NotFound";

/// Errors raised by the EC2 gateway.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Ec2GatewayError {
    /// Raised when credentials or the endpoint are unusable.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a request cannot be signed.
    #[error("failed to sign {action} request: {message}")]
    Signing {
        /// API action being signed.
        action: String,
        /// Description of the failure.
        message: String,
    },
    /// Raised when the endpoint cannot be reached.
    #[error("{action} request failed: {message}")]
    Transport {
        /// API action being called.
        action: String,
        /// Message reported by the HTTP client.
        message: String,
    },
    /// Raised when the API rejects a request.
    #[error("{action} rejected with HTTP {status} ({code}): {message}")]
    Api {
        /// API action being called.
        action: String,
        /// HTTP status code.
        status: u16,
        /// EC2 error code, for example `UnauthorizedOperation`.
        code: String,
        /// Message returned by the API.
        message: String,
    },
    /// Raised when a response cannot be interpreted.
    #[error("unexpected {action} response: {message}")]
    Response {
        /// API action being called.
        action: String,
        /// Description of the problem.
        message: String,
    },
}

impl Ec2GatewayError {
    /// Returns `true` when the API reported an unknown instance identifier.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { code, .. } if code == NOT_FOUND_CODE)
    }
}

impl From<ConfigError> for Ec2GatewayError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
