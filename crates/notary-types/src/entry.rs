//! Rows of the consumption ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Party, TxId};

/// One consumed state: who consumed it, on whose behalf, and when.
///
/// Written once per state and never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumingEntry {
    /// The transaction that consumed the state.
    pub consuming_tx: TxId,
    /// The party that requested the commit.
    pub requester: Party,
    /// When the consumption was recorded.
    pub consumed_at: DateTime<Utc>,
}
