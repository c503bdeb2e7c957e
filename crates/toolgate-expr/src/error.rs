//! Loader/compiler failure type (§4.6.3, §7).

use toolgate_core::error::ErrorCode;

/// A bundle failed to load or compile. Carries a human-readable message and
/// the stable [`ErrorCode`] it maps to; raised synchronously from the
/// loader/compiler, never at call time (§7's "Configuration error").
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ConfigError {
    /// What went wrong, suitable for surfacing to a bundle author.
    pub message: String,
    /// Stable machine-readable classification.
    pub code: ErrorCode,
}

impl ConfigError {
    /// Build a `ConfigError` with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}
