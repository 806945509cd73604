//! Concurrent contention tests for the consumption ledger.
//!
//! These exercise `record_if_absent` from many OS threads at once with
//! overlapping key sets, checking the properties that make the ledger safe:
//! exactly one winner per state, no partial writes, and no deadlock when
//! callers present the same keys in opposite orders.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Barrier,
};

use chrono::Utc;
use notary_ledger::{ConsumptionLedger, JournaledLedger, RecordResult, ShardedLedger};
use notary_types::{Party, PublicKey, StateRef, TxId};

/// Number of threads racing in each test.
const CONCURRENCY: usize = 16;

/// Number of rounds for the exactly-one-winner test.
const ROUNDS: usize = 50;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn state(round: usize, index: u32) -> StateRef {
    StateRef::new(TxId::from_label(&format!("origin-{round}")), index)
}

fn tx(round: usize, task: usize) -> TxId {
    TxId::from_label(&format!("spender-{round}-{task}"))
}

fn party(task: usize) -> Party {
    #[allow(clippy::cast_possible_truncation)]
    Party::new(format!("caller-{task}"), PublicKey([task as u8; 32]))
}

// ---------------------------------------------------------------------------
// Test: many spenders of one state: exactly one wins per round
// ---------------------------------------------------------------------------

#[test]
fn exactly_one_winner_per_state() {
    let ledger = ShardedLedger::new(8, 4);

    for round in 0..ROUNDS {
        let barrier = Barrier::new(CONCURRENCY);
        let inputs = BTreeSet::from([state(round, 0)]);

        let results: Vec<(usize, RecordResult)> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..CONCURRENCY)
                .map(|task| {
                    let ledger = &ledger;
                    let barrier = &barrier;
                    let inputs = &inputs;
                    s.spawn(move || {
                        barrier.wait();
                        let result = ledger
                            .record_if_absent(inputs, tx(round, task), &party(task), Utc::now())
                            .expect("record should not error");
                        (task, result)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("thread panicked")).collect()
        });

        let winners: Vec<usize> = results
            .iter()
            .filter(|(_, r)| *r == RecordResult::Recorded)
            .map(|(task, _)| *task)
            .collect();
        assert_eq!(winners.len(), 1, "round {round}: expected one winner, got {winners:?}");

        let winner_tx = tx(round, winners[0]);
        for (task, result) in &results {
            if *task == winners[0] {
                continue;
            }
            let RecordResult::Conflicting(conflicts) = result else {
                panic!("round {round}: loser {task} got {result:?}");
            };
            assert_eq!(conflicts[&state(round, 0)], winner_tx);
        }

        let entry = ledger.entry(&state(round, 0)).unwrap().unwrap();
        assert_eq!(entry.consuming_tx, winner_tx);
    }
}

// ---------------------------------------------------------------------------
// Test: overlapping multi-key sets: atomic, no partial writes
// ---------------------------------------------------------------------------

/// Each task spends a window of 4 consecutive states out of a shared pool,
/// overlapping its neighbours. Afterwards every consumed state must belong
/// to a winner whose whole window was recorded, and no loser may own any
/// state.
#[test]
fn overlapping_key_sets_are_all_or_nothing() {
    const POOL: u32 = 32;
    let ledger = ShardedLedger::new(4, 2);
    let barrier = Barrier::new(CONCURRENCY);

    let windows: Vec<BTreeSet<StateRef>> = (0..CONCURRENCY)
        .map(|task| {
            #[allow(clippy::cast_possible_truncation)]
            let start = (task as u32 * 2) % POOL;
            (0..4).map(|i| state(0, (start + i) % POOL)).collect()
        })
        .collect();

    let results: BTreeMap<usize, RecordResult> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..CONCURRENCY)
            .map(|task| {
                let ledger = &ledger;
                let barrier = &barrier;
                let window = &windows[task];
                s.spawn(move || {
                    barrier.wait();
                    let result = ledger
                        .record_if_absent(window, tx(0, task), &party(task), Utc::now())
                        .expect("record should not error");
                    (task, result)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("thread panicked")).collect()
    });

    let mut owned = 0;
    for (task, result) in &results {
        let inputs = ledger.transaction_inputs(&tx(0, *task)).unwrap();
        match result {
            RecordResult::Recorded => {
                assert_eq!(inputs.as_ref(), Some(&windows[*task]));
                for s in &windows[*task] {
                    assert_eq!(ledger.entry(s).unwrap().unwrap().consuming_tx, tx(0, *task));
                }
                owned += windows[*task].len();
            }
            RecordResult::Conflicting(conflicts) => {
                assert!(inputs.is_none(), "loser {task} must not be indexed");
                assert!(!conflicts.is_empty());
                assert!(conflicts.values().all(|c| *c != tx(0, *task)));
            }
            RecordResult::TransactionMismatch { .. } => panic!("unexpected mismatch"),
            RecordResult::StaleReferences(_) => panic!("unexpected stale references"),
        }
    }
    assert_eq!(ledger.len(), owned);
}

// ---------------------------------------------------------------------------
// Test: same keys presented in opposite orders: no deadlock
// ---------------------------------------------------------------------------

/// Half the threads build their key set from the top of the range, half
/// from the bottom. The ledger canonicalises lock order, so this must
/// finish; a naive per-key lock would eventually deadlock here.
#[test]
fn opposite_key_orders_do_not_deadlock() {
    let ledger = ShardedLedger::new(16, 4);

    for round in 0..ROUNDS {
        std::thread::scope(|s| {
            for task in 0..CONCURRENCY {
                let ledger = &ledger;
                s.spawn(move || {
                    let mut keys: Vec<StateRef> = (0..16).map(|i| state(round, i)).collect();
                    if task % 2 == 1 {
                        keys.reverse();
                    }
                    let inputs: BTreeSet<StateRef> = keys.into_iter().collect();
                    ledger
                        .record_if_absent(&inputs, tx(round, task), &party(task), Utc::now())
                        .expect("record should not error");
                });
            }
        });
        let owners: BTreeSet<TxId> = (0..16)
            .map(|i| ledger.entry(&state(round, i)).unwrap().unwrap().consuming_tx)
            .collect();
        assert_eq!(owners.len(), 1, "round {round}: all 16 states must share one owner");
    }
}

// ---------------------------------------------------------------------------
// Test: concurrent identical retries: one record, all see themselves
// ---------------------------------------------------------------------------

#[test]
fn concurrent_identical_retries_record_once() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = JournaledLedger::open(dir.path().join("ledger.jsonl"), 8, 4).unwrap();
    let inputs = BTreeSet::from([state(0, 0), state(0, 1), state(0, 2)]);
    let the_tx = tx(0, 0);
    let barrier = Barrier::new(CONCURRENCY);

    let results: Vec<RecordResult> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..CONCURRENCY)
            .map(|_| {
                let (ledger, barrier, inputs) = (&ledger, &barrier, &inputs);
                s.spawn(move || {
                    barrier.wait();
                    ledger
                        .record_if_absent(inputs, the_tx, &party(0), Utc::now())
                        .expect("record should not error")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("thread panicked")).collect()
    });

    let recorded = results.iter().filter(|r| **r == RecordResult::Recorded).count();
    assert_eq!(recorded, 1);
    for result in &results {
        if let RecordResult::Conflicting(conflicts) = result {
            assert!(conflicts.values().all(|c| *c == the_tx));
        }
    }
    assert_eq!(ledger.len(), 3);

    let journal = std::fs::read_to_string(ledger.path()).unwrap();
    assert_eq!(journal.lines().count(), 1, "a retry must not be journaled");
}
