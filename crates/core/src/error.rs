//! Error taxonomy shared by all external collaborators.
//!
//! The scheduler's retry logic only needs one question answered: is this
//! failure worth retrying? Transient faults (timeouts, rate limits,
//! temporary unavailability) are; everything else is handled at the call
//! site — rejections become FAILED records, invalid data is coerced to
//! HOLD, auth/config problems fail fast at startup.

use std::time::Duration;
use thiserror::Error;

/// Failure from an external collaborator (exchange, decision service,
/// news provider, notification channel).
#[derive(Debug, Error)]
pub enum ApiError {
    /// The call exceeded its bounded timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The collaborator asked us to back off.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Temporary unavailability (5xx, connection refused, DNS).
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The collaborator rejected an otherwise well-formed request, e.g. an
    /// order the exchange refused at execution time. Message is preserved
    /// verbatim for the ledger.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The collaborator answered with a payload we could not interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Credentials missing or refused.
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl ApiError {
    /// True for failures that a bounded retry with backoff may resolve.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited(_) | Self::Unavailable(_)
        )
    }
}

/// Startup-time configuration failure for one asset. Assets with invalid
/// configuration are surfaced once and never admitted into the orchestrator.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("asset `{asset}`: {reason}")]
    InvalidAsset { asset: String, reason: String },

    #[error("missing credential: {0}")]
    MissingCredential(String),
}
