//! Sharded in-memory consumption ledger.
//!
//! States are partitioned into `N` shards by hash, each behind its own
//! `RwLock`. Transaction ids are partitioned the same way into a separate
//! index recording the input set each transaction was committed with.
//!
//! ## Lock discipline
//!
//! A write acquires, in this order and holding all of them until done:
//! 1. the write lock of the transaction-index shard owning `tx_id`
//! 2. the lock of every state shard touched by `inputs` or `references`, in
//!    ascending shard index: write for shards receiving inputs, read for
//!    shards holding only references
//!
//! Every writer follows the same global order, so two writers with
//! overlapping key sets serialize on their lowest common shard and can never
//! deadlock or both see a shared state as absent. Readers take one shard
//! read lock at a time.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::atomic::{AtomicUsize, Ordering},
};

use chrono::{DateTime, Utc};
use notary_types::{ConsumingEntry, NotaryConfig, Party, Result, StateRef, TxId};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ledger::{ConsumptionLedger, RecordResult};

type StateShard = HashMap<StateRef, ConsumingEntry>;
type TxShard = HashMap<TxId, BTreeSet<StateRef>>;

/// In-memory [`ConsumptionLedger`] with canonical-order multi-shard locking.
pub struct ShardedLedger {
    state_shards: Box<[RwLock<StateShard>]>,
    tx_shards: Box<[RwLock<TxShard>]>,
    /// Number of consumed states across all shards.
    consumed: AtomicUsize,
}

/// Map the leading digest bytes of an id onto `[0, buckets)`.
#[allow(clippy::cast_possible_truncation)]
fn bucket(digest: &[u8; 32], salt: u32, buckets: usize) -> usize {
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let mixed = u64::from_le_bytes(head) ^ u64::from(salt).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    (mixed % buckets as u64) as usize
}

impl ShardedLedger {
    /// Create an empty ledger.
    ///
    /// # Panics
    /// Panics if either shard count is zero.
    #[must_use]
    pub fn new(state_shards: usize, tx_shards: usize) -> Self {
        assert!(state_shards > 0, "ShardedLedger state_shards must be > 0");
        assert!(tx_shards > 0, "ShardedLedger tx_shards must be > 0");
        Self {
            state_shards: (0..state_shards).map(|_| RwLock::default()).collect(),
            tx_shards: (0..tx_shards).map(|_| RwLock::default()).collect(),
            consumed: AtomicUsize::new(0),
        }
    }

    /// Create an empty ledger sized from configuration.
    ///
    /// # Errors
    /// Returns `Configuration` if the configuration is invalid.
    pub fn from_config(config: &NotaryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.ledger_shards, config.tx_index_shards))
    }

    fn state_shard(&self, state: &StateRef) -> usize {
        bucket(state.tx_id.as_bytes(), state.index, self.state_shards.len())
    }

    fn tx_shard(&self, tx_id: &TxId) -> usize {
        bucket(tx_id.as_bytes(), 0, self.tx_shards.len())
    }

    /// Number of state shards.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.state_shards.len()
    }

    /// The check-and-record critical section.
    ///
    /// `persist` runs after all checks pass and before anything becomes
    /// visible, while every lock is still held. If it fails, nothing is
    /// written.
    pub(crate) fn record_with<F>(
        &self,
        inputs: &BTreeSet<StateRef>,
        references: &BTreeSet<StateRef>,
        tx_id: TxId,
        requester: &Party,
        timestamp: DateTime<Utc>,
        persist: F,
    ) -> Result<RecordResult>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut tx_guard = self.tx_shards[self.tx_shard(&tx_id)].write();

        if let Some(recorded) = tx_guard.get(&tx_id) {
            if recorded != inputs {
                return Ok(RecordResult::TransactionMismatch {
                    recorded: recorded.clone(),
                });
            }
            // Same transaction, same inputs: everything is already ours.
            let own = inputs.iter().map(|state| (*state, tx_id)).collect();
            return Ok(RecordResult::Conflicting(own));
        }

        // Shard id -> needs write. A shard holding both an input and a
        // reference is taken once, for writing.
        let mut wanted: BTreeMap<usize, bool> = BTreeMap::new();
        for reference in references {
            wanted.entry(self.state_shard(reference)).or_insert(false);
        }
        for input in inputs {
            wanted.insert(self.state_shard(input), true);
        }
        let mut guards: BTreeMap<usize, ShardGuard<'_>> = BTreeMap::new();
        for (id, write) in wanted {
            let lock = &self.state_shards[id];
            let guard = if write {
                ShardGuard::Write(lock.write())
            } else {
                ShardGuard::Read(lock.read())
            };
            guards.insert(id, guard);
        }

        let consumer_of = |state: &StateRef| {
            guards[&self.state_shard(state)]
                .get(state)
                .map(|entry| entry.consuming_tx)
        };

        let stale: BTreeMap<StateRef, TxId> = references
            .iter()
            .filter_map(|r| consumer_of(r).map(|consumer| (*r, consumer)))
            .filter(|(_, consumer)| *consumer != tx_id)
            .collect();
        if !stale.is_empty() {
            return Ok(RecordResult::StaleReferences(stale));
        }

        let conflicts: BTreeMap<StateRef, TxId> = inputs
            .iter()
            .filter_map(|input| consumer_of(input).map(|consumer| (*input, consumer)))
            .collect();
        if !conflicts.is_empty() {
            return Ok(RecordResult::Conflicting(conflicts));
        }

        persist()?;

        for input in inputs {
            if let Some(ShardGuard::Write(shard)) = guards.get_mut(&self.state_shard(input)) {
                shard.insert(
                    *input,
                    ConsumingEntry {
                        consuming_tx: tx_id,
                        requester: requester.clone(),
                        consumed_at: timestamp,
                    },
                );
            }
        }
        tx_guard.insert(tx_id, inputs.clone());
        self.consumed.fetch_add(inputs.len(), Ordering::Relaxed);

        Ok(RecordResult::Recorded)
    }
}

/// A held state shard lock: read for reference-only shards, write for
/// shards receiving inputs.
enum ShardGuard<'a> {
    Read(RwLockReadGuard<'a, StateShard>),
    Write(RwLockWriteGuard<'a, StateShard>),
}

impl ShardGuard<'_> {
    fn get(&self, state: &StateRef) -> Option<&ConsumingEntry> {
        match self {
            Self::Read(shard) => shard.get(state),
            Self::Write(shard) => shard.get(state),
        }
    }
}

impl Default for ShardedLedger {
    fn default() -> Self {
        Self::new(
            notary_types::constants::DEFAULT_LEDGER_SHARDS,
            notary_types::constants::DEFAULT_TX_INDEX_SHARDS,
        )
    }
}

impl ConsumptionLedger for ShardedLedger {
    fn lookup(&self, states: &BTreeSet<StateRef>) -> Result<BTreeMap<StateRef, TxId>> {
        let mut found = BTreeMap::new();
        for state in states {
            let shard = self.state_shards[self.state_shard(state)].read();
            if let Some(entry) = shard.get(state) {
                found.insert(*state, entry.consuming_tx);
            }
        }
        Ok(found)
    }

    fn record_if_absent_referencing(
        &self,
        inputs: &BTreeSet<StateRef>,
        references: &BTreeSet<StateRef>,
        tx_id: TxId,
        requester: &Party,
        timestamp: DateTime<Utc>,
    ) -> Result<RecordResult> {
        self.record_with(inputs, references, tx_id, requester, timestamp, || Ok(()))
    }

    fn entry(&self, state: &StateRef) -> Result<Option<ConsumingEntry>> {
        Ok(self.state_shards[self.state_shard(state)]
            .read()
            .get(state)
            .cloned())
    }

    fn transaction_inputs(&self, tx_id: &TxId) -> Result<Option<BTreeSet<StateRef>>> {
        Ok(self.tx_shards[self.tx_shard(tx_id)].read().get(tx_id).cloned())
    }

    fn len(&self) -> usize {
        self.consumed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use notary_types::{NotaryError, PublicKey};

    use super::*;

    fn state(label: &str, index: u32) -> StateRef {
        StateRef::new(TxId::from_label(label), index)
    }

    fn set(states: &[StateRef]) -> BTreeSet<StateRef> {
        states.iter().copied().collect()
    }

    fn alice() -> Party {
        Party::new("alice", PublicKey([1u8; 32]))
    }

    #[test]
    fn record_then_lookup() {
        let ledger = ShardedLedger::new(8, 4);
        let tx = TxId::from_label("B");
        let inputs = set(&[state("A", 0), state("A", 1)]);

        let result = ledger.record_if_absent(&inputs, tx, &alice(), Utc::now()).unwrap();
        assert_eq!(result, RecordResult::Recorded);
        assert_eq!(ledger.len(), 2);

        let found = ledger.lookup(&set(&[state("A", 0), state("A", 2)])).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&state("A", 0)], tx);
    }

    #[test]
    fn entry_records_requester_and_time() {
        let ledger = ShardedLedger::new(8, 4);
        let now = Utc::now();
        ledger
            .record_if_absent(&set(&[state("A", 0)]), TxId::from_label("B"), &alice(), now)
            .unwrap();

        let entry = ledger.entry(&state("A", 0)).unwrap().unwrap();
        assert_eq!(entry.consuming_tx, TxId::from_label("B"));
        assert_eq!(entry.requester, alice());
        assert_eq!(entry.consumed_at, now);
        assert!(ledger.entry(&state("A", 1)).unwrap().is_none());
    }

    #[test]
    fn conflict_reports_consumer_and_writes_nothing() {
        let ledger = ShardedLedger::new(8, 4);
        ledger
            .record_if_absent(&set(&[state("A", 0)]), TxId::from_label("B"), &alice(), Utc::now())
            .unwrap();

        // (A,1) is free, (A,0) is taken: the whole request must be refused.
        let result = ledger
            .record_if_absent(
                &set(&[state("A", 0), state("A", 1)]),
                TxId::from_label("C"),
                &alice(),
                Utc::now(),
            )
            .unwrap();

        let RecordResult::Conflicting(conflicts) = result else {
            panic!("Expected Conflicting, got: {result:?}");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[&state("A", 0)], TxId::from_label("B"));
        assert!(ledger.entry(&state("A", 1)).unwrap().is_none(), "no partial write");
        assert!(ledger.transaction_inputs(&TxId::from_label("C")).unwrap().is_none());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn retry_reports_self_as_consumer() {
        let ledger = ShardedLedger::new(8, 4);
        let tx = TxId::from_label("B");
        let inputs = set(&[state("A", 0), state("A", 1)]);
        ledger.record_if_absent(&inputs, tx, &alice(), Utc::now()).unwrap();

        let result = ledger.record_if_absent(&inputs, tx, &alice(), Utc::now()).unwrap();
        let RecordResult::Conflicting(conflicts) = result else {
            panic!("Expected Conflicting, got: {result:?}");
        };
        assert_eq!(conflicts.len(), 2);
        assert!(conflicts.values().all(|consumer| *consumer == tx));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn same_tx_with_different_inputs_is_mismatch() {
        let ledger = ShardedLedger::new(8, 4);
        let tx = TxId::from_label("B");
        ledger
            .record_if_absent(&set(&[state("A", 0)]), tx, &alice(), Utc::now())
            .unwrap();

        let result = ledger
            .record_if_absent(&set(&[state("A", 1)]), tx, &alice(), Utc::now())
            .unwrap();
        assert_eq!(
            result,
            RecordResult::TransactionMismatch {
                recorded: set(&[state("A", 0)])
            }
        );
        assert!(ledger.entry(&state("A", 1)).unwrap().is_none());
    }

    #[test]
    fn empty_input_transaction_is_indexed() {
        let ledger = ShardedLedger::new(8, 4);
        let tx = TxId::from_label("T");
        let result = ledger.record_if_absent(&BTreeSet::new(), tx, &alice(), Utc::now()).unwrap();
        assert_eq!(result, RecordResult::Recorded);
        assert!(ledger.is_empty());
        assert_eq!(ledger.transaction_inputs(&tx).unwrap(), Some(BTreeSet::new()));
    }

    #[test]
    fn single_shard_ledger_behaves_identically() {
        let ledger = ShardedLedger::new(1, 1);
        ledger
            .record_if_absent(&set(&[state("A", 0)]), TxId::from_label("B"), &alice(), Utc::now())
            .unwrap();
        let result = ledger
            .record_if_absent(&set(&[state("A", 0)]), TxId::from_label("C"), &alice(), Utc::now())
            .unwrap();
        assert!(matches!(result, RecordResult::Conflicting(_)));
    }

    #[test]
    fn failed_persist_leaves_no_trace() {
        let ledger = ShardedLedger::new(8, 4);
        let tx = TxId::from_label("B");
        let inputs = set(&[state("A", 0)]);
        let err = ledger
            .record_with(&inputs, &BTreeSet::new(), tx, &alice(), Utc::now(), || {
                Err(NotaryError::LedgerWriteFailed {
                    reason: "disk full".into(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, NotaryError::LedgerWriteFailed { .. }));
        assert!(ledger.is_empty());
        assert!(ledger.transaction_inputs(&tx).unwrap().is_none());
    }

    #[test]
    fn stale_reference_refuses_whole_request() {
        let ledger = ShardedLedger::new(8, 4);
        ledger
            .record_if_absent(&set(&[state("R", 0)]), TxId::from_label("X"), &alice(), Utc::now())
            .unwrap();

        let result = ledger
            .record_if_absent_referencing(
                &set(&[state("A", 0)]),
                &set(&[state("R", 0), state("R", 1)]),
                TxId::from_label("B"),
                &alice(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(
            result,
            RecordResult::StaleReferences(BTreeMap::from([(state("R", 0), TxId::from_label("X"))]))
        );
        assert!(ledger.entry(&state("A", 0)).unwrap().is_none());
        assert!(ledger.transaction_inputs(&TxId::from_label("B")).unwrap().is_none());
    }

    #[test]
    fn references_are_read_not_written() {
        // One shard: every input and reference shares a lock.
        let ledger = ShardedLedger::new(1, 1);
        let result = ledger
            .record_if_absent_referencing(
                &set(&[state("A", 0)]),
                &set(&[state("R", 0)]),
                TxId::from_label("B"),
                &alice(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(result, RecordResult::Recorded);
        assert!(ledger.entry(&state("R", 0)).unwrap().is_none());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn retry_ignores_references_consumed_since() {
        let ledger = ShardedLedger::new(8, 4);
        let tx = TxId::from_label("B");
        let inputs = set(&[state("A", 0)]);
        let references = set(&[state("R", 0)]);
        ledger
            .record_if_absent_referencing(&inputs, &references, tx, &alice(), Utc::now())
            .unwrap();
        ledger
            .record_if_absent(&references, TxId::from_label("X"), &alice(), Utc::now())
            .unwrap();

        let result = ledger
            .record_if_absent_referencing(&inputs, &references, tx, &alice(), Utc::now())
            .unwrap();
        assert!(matches!(result, RecordResult::Conflicting(own) if own.values().all(|c| *c == tx)));
    }

    #[test]
    fn from_config_rejects_zero_shards() {
        let cfg = NotaryConfig {
            ledger_shards: 0,
            ..NotaryConfig::default()
        };
        assert!(ShardedLedger::from_config(&cfg).is_err());
    }

    #[test]
    #[should_panic(expected = "state_shards must be > 0")]
    fn zero_shards_panics() {
        let _ = ShardedLedger::new(0, 1);
    }
}
