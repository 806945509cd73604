//! Journaled consumption ledger: durable single-writer append log.
//!
//! Every successful commit is appended to a JSON-lines journal and flushed to
//! disk inside the ledger's critical section, before the in-memory index
//! makes it visible. On open, the journal is replayed into a fresh
//! [`ShardedLedger`].
//!
//! ## Crash handling
//!
//! - A trailing line without a newline is a torn write from a crash: it was
//!   never acknowledged, so it is dropped and the file truncated.
//! - A malformed line *followed by* further lines is corruption and fails
//!   the open.
//! - After any append failure the journal refuses further writes, so a torn
//!   line can never end up in the middle of the file.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use notary_types::{ConsumingEntry, NotaryConfig, NotaryError, Party, Result, StateRef, TxId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    ledger::{ConsumptionLedger, RecordResult},
    memory::ShardedLedger,
};

/// One committed batch, as written to the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub tx_id: TxId,
    pub inputs: Vec<StateRef>,
    pub requester: Party,
    pub consumed_at: DateTime<Utc>,
}

/// [`ShardedLedger`] made durable by an append-only journal.
pub struct JournaledLedger {
    index: ShardedLedger,
    journal: Mutex<File>,
    path: PathBuf,
    /// Set after a failed append. All further writes are refused.
    failed: AtomicBool,
}

impl JournaledLedger {
    /// Open (or create) the journal at `path` and replay it.
    ///
    /// # Errors
    /// - `Io` if the file cannot be opened, read or truncated
    /// - `LedgerCorrupted` if a complete line fails to parse or replays into
    ///   a conflict
    pub fn open(path: impl AsRef<Path>, state_shards: usize, tx_shards: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut raw = Vec::new();
        file.read_to_end(&mut raw)?;

        let index = ShardedLedger::new(state_shards, tx_shards);
        let (replayed, valid_len) = replay(&index, &raw)?;

        if valid_len < raw.len() {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = raw.len() - valid_len,
                "Dropping torn trailing journal line"
            );
            file.set_len(valid_len as u64)?;
            file.sync_data()?;
        }

        tracing::info!(
            path = %path.display(),
            records = replayed,
            consumed_states = index.len(),
            "Consumption journal replayed"
        );

        Ok(Self {
            index,
            journal: Mutex::new(file),
            path,
            failed: AtomicBool::new(false),
        })
    }

    /// Open the journal named by `config.journal_path`.
    ///
    /// # Errors
    /// Returns `Configuration` if no journal path is set or the config is
    /// invalid, plus everything [`JournaledLedger::open`] returns.
    pub fn from_config(config: &NotaryConfig) -> Result<Self> {
        config.validate()?;
        let path = config
            .journal_path
            .as_deref()
            .ok_or_else(|| NotaryError::Configuration("journal_path is not set".into()))?;
        Self::open(path, config.ledger_shards, config.tx_index_shards)
    }

    /// Location of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &JournalRecord) -> Result<()> {
        if self.failed.load(Ordering::Acquire) {
            return Err(NotaryError::LedgerWriteFailed {
                reason: "journal disabled after an earlier write failure".into(),
            });
        }

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = self.journal.lock();
        let written = file.write_all(&line).and_then(|()| file.sync_data());
        if let Err(e) = written {
            self.failed.store(true, Ordering::Release);
            tracing::error!(
                path = %self.path.display(),
                tx_id = %record.tx_id,
                error = %e,
                "Journal append failed; ledger is now read-only"
            );
            return Err(NotaryError::LedgerWriteFailed {
                reason: e.to_string(),
            });
        }
        Ok(())
    }
}

/// Replay complete lines of `raw` into `index`.
///
/// Returns the number of records replayed and the byte length of the valid
/// prefix (everything up to and including the last newline).
fn replay(index: &ShardedLedger, raw: &[u8]) -> Result<(usize, usize)> {
    let valid_len = raw.iter().rposition(|b| *b == b'\n').map_or(0, |pos| pos + 1);

    let mut replayed = 0;
    for (line_no, line) in raw[..valid_len].split(|b| *b == b'\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        let record: JournalRecord =
            serde_json::from_slice(line).map_err(|e| NotaryError::LedgerCorrupted {
                reason: format!("line {}: {e}", line_no + 1),
            })?;
        let inputs: BTreeSet<StateRef> = record.inputs.iter().copied().collect();
        let result = index.record_with(
            &inputs,
            &BTreeSet::new(),
            record.tx_id,
            &record.requester,
            record.consumed_at,
            || Ok(()),
        )?;
        if result != RecordResult::Recorded {
            tracing::error!(line = line_no + 1, tx_id = %record.tx_id, "Journal replay conflict");
            return Err(NotaryError::LedgerCorrupted {
                reason: format!(
                    "line {}: transaction {} conflicts with an earlier record",
                    line_no + 1,
                    record.tx_id
                ),
            });
        }
        replayed += 1;
    }
    Ok((replayed, valid_len))
}

impl ConsumptionLedger for JournaledLedger {
    fn lookup(&self, states: &BTreeSet<StateRef>) -> Result<BTreeMap<StateRef, TxId>> {
        self.index.lookup(states)
    }

    fn record_if_absent_referencing(
        &self,
        inputs: &BTreeSet<StateRef>,
        references: &BTreeSet<StateRef>,
        tx_id: TxId,
        requester: &Party,
        timestamp: DateTime<Utc>,
    ) -> Result<RecordResult> {
        self.index.record_with(inputs, references, tx_id, requester, timestamp, || {
            self.append(&JournalRecord {
                tx_id,
                inputs: inputs.iter().copied().collect(),
                requester: requester.clone(),
                consumed_at: timestamp,
            })
        })
    }

    fn entry(&self, state: &StateRef) -> Result<Option<ConsumingEntry>> {
        self.index.entry(state)
    }

    fn transaction_inputs(&self, tx_id: &TxId) -> Result<Option<BTreeSet<StateRef>>> {
        self.index.transaction_inputs(tx_id)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}
