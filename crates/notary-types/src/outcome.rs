//! Commit outcomes and the rejection taxonomy.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{StateRef, TimeWindow, TxId};

/// Why a commit request was turned down.
///
/// Every variant carries enough detail for upstream diagnosis. None of them
/// is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Inputs already consumed by another transaction.
    Conflict {
        /// Offending input → the transaction that consumed it.
        conflicts: BTreeMap<StateRef, TxId>,
    },
    /// The current time is outside the window, or the window is malformed.
    TimeWindowInvalid {
        window: TimeWindow,
        current_time: DateTime<Utc>,
    },
    /// A reference state was already consumed by another transaction.
    ReferenceStateConflict {
        /// Stale reference → the transaction that consumed it.
        conflicts: BTreeMap<StateRef, TxId>,
    },
    /// The requester's signature did not verify.
    RequestSignatureInvalid { reason: String },
    /// `tx_id` was already committed with a different input set.
    TransactionDuplicateMismatch {
        tx_id: TxId,
        recorded_inputs: BTreeSet<StateRef>,
    },
}

impl RejectionReason {
    /// Stable short name, used as a log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::TimeWindowInvalid { .. } => "time_window_invalid",
            Self::ReferenceStateConflict { .. } => "reference_state_conflict",
            Self::RequestSignatureInvalid { .. } => "request_signature_invalid",
            Self::TransactionDuplicateMismatch { .. } => "transaction_duplicate_mismatch",
        }
    }
}

fn fmt_conflicts(f: &mut fmt::Formatter<'_>, conflicts: &BTreeMap<StateRef, TxId>) -> fmt::Result {
    for (i, (state, consumer)) in conflicts.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{state} consumed by {consumer}")?;
    }
    Ok(())
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { conflicts } => {
                write!(f, "input state conflict: ")?;
                fmt_conflicts(f, conflicts)
            }
            Self::TimeWindowInvalid {
                window,
                current_time,
            } => write!(
                f,
                "time window {window} invalid at {}",
                current_time.to_rfc3339()
            ),
            Self::ReferenceStateConflict { conflicts } => {
                write!(f, "reference state conflict: ")?;
                fmt_conflicts(f, conflicts)
            }
            Self::RequestSignatureInvalid { reason } => {
                write!(f, "request signature invalid: {reason}")
            }
            Self::TransactionDuplicateMismatch {
                tx_id,
                recorded_inputs,
            } => write!(
                f,
                "transaction {tx_id} already committed with {} different input(s)",
                recorded_inputs.len()
            ),
        }
    }
}

/// Result of one commit request. Produced exactly once per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitOutcome {
    /// Every input is now recorded as consumed by the request's transaction.
    Committed,
    /// Nothing was recorded for this request.
    Rejected(RejectionReason),
}

impl CommitOutcome {
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    /// The rejection reason, if any.
    #[must_use]
    pub fn rejection(&self) -> Option<&RejectionReason> {
        match self {
            Self::Committed => None,
            Self::Rejected(reason) => Some(reason),
        }
    }
}

impl fmt::Display for CommitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed => write!(f, "COMMITTED"),
            Self::Rejected(reason) => write!(f, "REJECTED({})", reason.kind()),
        }
    }
}
