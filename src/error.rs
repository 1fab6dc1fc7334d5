/**
 * Error types shared by the detection and correction engine
 */

use thiserror::Error;

/// Failure to turn an embedded capture timestamp into an absolute time.
///
/// Never surfaced by a scan: the extractor folds it into "no date available".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("malformed capture timestamp: {0:?}")]
    Malformed(String),

    #[error("invalid UTC offset: {0:?}")]
    InvalidOffset(String),

    #[error("local time {0} does not exist in the fallback timezone")]
    Nonexistent(String),
}

/// Errors reported by an asset store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("payload unavailable for {identifier}: {reason}")]
    PayloadUnavailable { identifier: String, reason: String },

    #[error("asset enumeration failed: {0}")]
    Enumeration(String),

    #[error("batch transaction failed{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    Transaction { message: Option<String> },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A correction batch that the store refused to commit.
#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("failed to correct {attempted} asset(s): {source}")]
    Transaction {
        attempted: usize,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("tolerance must not be negative (got {0})")]
    NegativeTolerance(f64),

    #[error("tolerance must be a finite number of seconds")]
    NonFiniteTolerance,

    #[error("progress interval must be at least 1")]
    ZeroProgressInterval,

    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
}
