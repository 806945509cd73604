//! Error types for the uniqueness notary.
//!
//! All errors use the `NT_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Request / structural errors
//! - 2xx: Signature errors
//! - 4xx: Commit rejections (domain outcomes)
//! - 5xx: Ledger / storage errors
//! - 6xx: Dispatch / bridge errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{DedupToken, RejectionReason, TxId};

/// Central error enum for all notary operations.
///
/// `Clone` so that one asynchronous commit result can be handed to every
/// waiter attached to the same deduplication token.
#[derive(Debug, Clone, Error)]
pub enum NotaryError {
    // =================================================================
    // Request Errors (1xx)
    // =================================================================
    /// The request is malformed: overlapping inputs and references,
    /// duplicate inputs, empty transaction id. A caller error, never a
    /// conflict.
    #[error("NT_ERR_100: Invalid commit request: {reason}")]
    InvalidRequest { reason: String },

    // =================================================================
    // Signature Errors (2xx)
    // =================================================================
    /// A public key could not be decoded.
    #[error("NT_ERR_200: Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// An attestation failed verification.
    #[error("NT_ERR_201: Attestation verification failed: {0}")]
    AttestationInvalid(String),

    // =================================================================
    // Commit Rejections (4xx)
    // =================================================================
    /// The commit was rejected. The structured reason says why.
    #[error("NT_ERR_400: Commit rejected: {0}")]
    Rejected(RejectionReason),

    // =================================================================
    // Ledger Errors (5xx)
    // =================================================================
    /// The durable ledger could not be read back consistently.
    #[error("NT_ERR_500: Ledger corrupted: {reason}")]
    LedgerCorrupted { reason: String },

    /// A ledger write failed. Nothing became visible for the request.
    #[error("NT_ERR_501: Ledger write failed: {reason}")]
    LedgerWriteFailed { reason: String },

    // =================================================================
    // Dispatch Errors (6xx)
    // =================================================================
    /// The caller stopped waiting. The commit itself keeps running.
    #[error("NT_ERR_600: Commit for {tx_id} timed out after {waited_ms}ms")]
    CommitTimedOut { tx_id: TxId, waited_ms: u64 },

    /// A deduplication token was reused for a different transaction.
    #[error("NT_ERR_601: Dedup token {token} already bound to transaction {bound_to}")]
    DedupTokenReused { token: DedupToken, bound_to: TxId },

    /// The worker running the commit went away before producing a result.
    #[error("NT_ERR_602: Commit worker lost: {0}")]
    WorkerLost(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Serialization / deserialization error.
    #[error("NT_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("NT_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk).
    #[error("NT_ERR_903: I/O error: {0}")]
    Io(String),
}

impl NotaryError {
    /// The structured rejection, if this error is one.
    #[must_use]
    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            Self::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    /// Whether the same request could succeed if submitted again later.
    ///
    /// True for time-dependent rejections and for storage or dispatch
    /// failures. Committed results, structural errors, signature failures
    /// and ledger-determined rejections are final.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected(reason) => matches!(reason, RejectionReason::TimeWindowInvalid { .. }),
            Self::LedgerCorrupted { .. }
            | Self::LedgerWriteFailed { .. }
            | Self::CommitTimedOut { .. }
            | Self::WorkerLost(_)
            | Self::Serialization(_)
            | Self::Io(_) => true,
            Self::InvalidRequest { .. }
            | Self::InvalidPublicKey(_)
            | Self::AttestationInvalid(_)
            | Self::DedupTokenReused { .. }
            | Self::Configuration(_) => false,
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, NotaryError>;

impl From<std::io::Error> for NotaryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for NotaryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<RejectionReason> for NotaryError {
    fn from(reason: RejectionReason) -> Self {
        Self::Rejected(reason)
    }
}
