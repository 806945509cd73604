//! The consumption ledger storage contract.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use notary_types::{ConsumingEntry, Party, Result, StateRef, TxId};

/// What [`ConsumptionLedger::record_if_absent`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordResult {
    /// Every input was absent and is now consumed by the transaction.
    Recorded,
    /// Some inputs were already present; nothing was written.
    ///
    /// Maps each already-present input to its recorded consumer. A consumer
    /// equal to the requesting transaction means the request is a retry.
    Conflicting(BTreeMap<StateRef, TxId>),
    /// The transaction id is already bound to a different input set; nothing
    /// was written.
    TransactionMismatch { recorded: BTreeSet<StateRef> },
    /// Some references are consumed by another transaction; nothing was
    /// written.
    StaleReferences(BTreeMap<StateRef, TxId>),
}

/// Durable mapping from consumed state to consuming transaction.
///
/// Implementations must make `record_if_absent` atomic over the **whole**
/// key set: no two calls may interleave such that both observe the same
/// state as absent, and no call may leave a partial write behind.
pub trait ConsumptionLedger: Send + Sync {
    /// The subset of `states` already consumed, with their consumers.
    ///
    /// Pure read, safe for unlimited concurrent callers.
    fn lookup(&self, states: &BTreeSet<StateRef>) -> Result<BTreeMap<StateRef, TxId>>;

    /// Atomically consume `inputs` for `tx_id` if none is already consumed
    /// and `tx_id` is not bound to another input set.
    fn record_if_absent(
        &self,
        inputs: &BTreeSet<StateRef>,
        tx_id: TxId,
        requester: &Party,
        timestamp: DateTime<Utc>,
    ) -> Result<RecordResult> {
        self.record_if_absent_referencing(inputs, &BTreeSet::new(), tx_id, requester, timestamp)
    }

    /// Like [`record_if_absent`](Self::record_if_absent), but also require
    /// that no state in `references` is consumed by a transaction other than
    /// `tx_id`, checked in the same critical section as the inputs.
    ///
    /// References are read, never written. A transaction already recorded
    /// with exactly `inputs` is reported as a retry before references are
    /// consulted.
    fn record_if_absent_referencing(
        &self,
        inputs: &BTreeSet<StateRef>,
        references: &BTreeSet<StateRef>,
        tx_id: TxId,
        requester: &Party,
        timestamp: DateTime<Utc>,
    ) -> Result<RecordResult>;

    /// Full ledger row for one state.
    fn entry(&self, state: &StateRef) -> Result<Option<ConsumingEntry>>;

    /// The input set `tx_id` was committed with.
    fn transaction_inputs(&self, tx_id: &TxId) -> Result<Option<BTreeSet<StateRef>>>;

    /// Number of consumed states.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L: ConsumptionLedger + ?Sized> ConsumptionLedger for std::sync::Arc<L> {
    fn lookup(&self, states: &BTreeSet<StateRef>) -> Result<BTreeMap<StateRef, TxId>> {
        (**self).lookup(states)
    }

    fn record_if_absent_referencing(
        &self,
        inputs: &BTreeSet<StateRef>,
        references: &BTreeSet<StateRef>,
        tx_id: TxId,
        requester: &Party,
        timestamp: DateTime<Utc>,
    ) -> Result<RecordResult> {
        (**self).record_if_absent_referencing(inputs, references, tx_id, requester, timestamp)
    }

    fn entry(&self, state: &StateRef) -> Result<Option<ConsumingEntry>> {
        (**self).entry(state)
    }

    fn transaction_inputs(&self, tx_id: &TxId) -> Result<Option<BTreeSet<StateRef>>> {
        (**self).transaction_inputs(tx_id)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}
