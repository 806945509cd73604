//! # notary-ledger
//!
//! **Consumption Ledger**: the durable record of which states are consumed
//! and by which transaction. This is the source of truth for double-spend
//! prevention and the only shared mutable resource of the notary.
//!
//! ## Architecture
//!
//! - [`ConsumptionLedger`]: the storage contract. `lookup` is a pure read;
//!   `record_if_absent` is the single atomicity-critical write.
//! - [`ShardedLedger`]: in-memory implementation, partitioned by state hash.
//!   A write locks the transaction-index shard for its `TxId`, then every
//!   state shard it touches in ascending shard order, so overlapping key sets
//!   from concurrent callers can neither deadlock nor interleave.
//! - [`JournaledLedger`]: a [`ShardedLedger`] backed by an append-only
//!   JSON-lines journal, replayed into memory on open.
//!
//! ## Invariants
//!
//! - A consumed state is written exactly once and never updated or deleted.
//! - For a fixed state, the first write to reach the critical section wins.
//! - A transaction id is bound to exactly one input set.

pub mod journal;
pub mod ledger;
pub mod memory;

pub use journal::{JournalRecord, JournaledLedger};
pub use ledger::{ConsumptionLedger, RecordResult};
pub use memory::ShardedLedger;
