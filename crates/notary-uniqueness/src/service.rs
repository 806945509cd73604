//! The uniqueness service.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use notary_ledger::{ConsumptionLedger, RecordResult};
use notary_types::{
    CommitOutcome, CommitRequest, NotaryConfig, ReferencePolicy, RejectionReason, Result, StateRef,
    TxId,
};

use crate::clock::{Clock, SystemClock};

/// Atomic check-and-record of state consumption.
///
/// Safe under unbounded concurrent invocation: all shared mutation goes
/// through the ledger's `record_if_absent`. Expects requests that already
/// passed structural validation.
pub struct UniquenessService<L> {
    ledger: L,
    clock: Arc<dyn Clock>,
    reference_policy: ReferencePolicy,
}

impl<L: ConsumptionLedger> UniquenessService<L> {
    /// Service over `ledger` using the system clock and the default
    /// reference policy.
    #[must_use]
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            clock: Arc::new(SystemClock),
            reference_policy: ReferencePolicy::default(),
        }
    }

    /// Service over `ledger` with the policy from `config`.
    #[must_use]
    pub fn from_config(ledger: L, config: &NotaryConfig) -> Self {
        Self::new(ledger).with_reference_policy(config.reference_policy)
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_reference_policy(mut self, policy: ReferencePolicy) -> Self {
        self.reference_policy = policy;
        self
    }

    /// Read-only view of the ledger.
    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    #[must_use]
    pub fn reference_policy(&self) -> ReferencePolicy {
        self.reference_policy
    }

    /// Decide the outcome of `request`, recording its inputs on success.
    ///
    /// Rejections are returned as `Ok(CommitOutcome::Rejected(..))`; `Err`
    /// is reserved for storage failures, after which nothing was recorded.
    pub fn commit(&self, request: &CommitRequest) -> Result<CommitOutcome> {
        let tx_id = request.tx_id;
        let now = self.clock.now();

        // 1. Time window, before any ledger access.
        if let Some(window) = request.time_window {
            if !window.is_well_formed() || !window.contains(now) {
                tracing::debug!(
                    tx_id = %tx_id,
                    window = %window,
                    now = %now.to_rfc3339(),
                    "Time window check failed"
                );
                return Ok(CommitOutcome::Rejected(RejectionReason::TimeWindowInvalid {
                    window,
                    current_time: now,
                }));
            }
        }

        // 2. The single write. Under `RejectStale` the references are
        // checked inside the same critical section as the inputs.
        let inputs = request.input_set();
        let references = request.reference_set();
        let result = match self.reference_policy {
            ReferencePolicy::RejectStale => self.ledger.record_if_absent_referencing(
                &inputs,
                &references,
                tx_id,
                &request.requester,
                now,
            )?,
            ReferencePolicy::Permissive => {
                self.warn_stale_references(&references, tx_id)?;
                self.ledger.record_if_absent(&inputs, tx_id, &request.requester, now)?
            }
        };

        // 3. Translate.
        let outcome = match result {
            RecordResult::Recorded => {
                tracing::info!(
                    tx_id = %tx_id,
                    inputs = inputs.len(),
                    requester = %request.requester,
                    "Transaction committed"
                );
                CommitOutcome::Committed
            }
            RecordResult::Conflicting(present) => {
                let conflicts = consumed_by_others(present, tx_id);
                if conflicts.is_empty() {
                    tracing::debug!(
                        tx_id = %tx_id,
                        "Idempotent resubmission of committed transaction"
                    );
                    CommitOutcome::Committed
                } else {
                    tracing::warn!(
                        tx_id = %tx_id,
                        conflicts = conflicts.len(),
                        requester = %request.requester,
                        "Double-spend attempt: inputs already consumed"
                    );
                    CommitOutcome::Rejected(RejectionReason::Conflict { conflicts })
                }
            }
            RecordResult::StaleReferences(stale) => {
                tracing::warn!(
                    tx_id = %tx_id,
                    stale = stale.len(),
                    requester = %request.requester,
                    "Reference states already consumed"
                );
                CommitOutcome::Rejected(RejectionReason::ReferenceStateConflict {
                    conflicts: stale,
                })
            }
            RecordResult::TransactionMismatch { recorded } => {
                tracing::warn!(
                    tx_id = %tx_id,
                    recorded = recorded.len(),
                    requested = inputs.len(),
                    "Transaction id resubmitted with a different input set"
                );
                CommitOutcome::Rejected(RejectionReason::TransactionDuplicateMismatch {
                    tx_id,
                    recorded_inputs: recorded,
                })
            }
        };
        Ok(outcome)
    }

    /// Log references consumed by other transactions; they do not block the
    /// commit under `Permissive`.
    fn warn_stale_references(&self, references: &BTreeSet<StateRef>, tx_id: TxId) -> Result<()> {
        if references.is_empty() {
            return Ok(());
        }
        let stale = consumed_by_others(self.ledger.lookup(references)?, tx_id);
        if !stale.is_empty() {
            tracing::warn!(
                tx_id = %tx_id,
                stale = stale.len(),
                "Committing against consumed reference states (permissive policy)"
            );
        }
        Ok(())
    }
}

/// Keep only entries consumed by a transaction other than `tx_id`.
fn consumed_by_others(found: BTreeMap<StateRef, TxId>, tx_id: TxId) -> BTreeMap<StateRef, TxId> {
    found
        .into_iter()
        .filter(|(_, consumer)| *consumer != tx_id)
        .collect()
}
