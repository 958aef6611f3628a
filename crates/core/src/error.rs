//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Content id not of the form `@author/permlink`.
    #[error("Invalid content id: {0}")]
    InvalidContentId(String),

    /// URL-safe content id could not be decoded.
    #[error("Invalid encoded content id: {0}")]
    InvalidEncoding(String),

    /// Unknown payout run kind.
    #[error("Unknown payout kind: {0}")]
    UnknownPayoutKind(String),

    /// Unknown payout run status.
    #[error("Unknown payout status: {0}")]
    UnknownPayoutStatus(String),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
