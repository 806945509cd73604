//! Configuration for a notary authority.

use serde::{Deserialize, Serialize};

use crate::{NotaryError, Result, constants};

/// What to do with a reference state that another transaction already
/// consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// Reject the request with `ReferenceStateConflict`.
    #[default]
    RejectStale,
    /// Log the stale reference and commit anyway.
    Permissive,
}

/// Configuration for a single notary authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotaryConfig {
    /// Handling of stale reference states.
    pub reference_policy: ReferencePolicy,
    /// Number of consumption ledger shards.
    pub ledger_shards: usize,
    /// Number of transaction-id index shards.
    pub tx_index_shards: usize,
    /// Upper bound on commits executing at once in the dispatch pool.
    pub max_concurrent_commits: usize,
    /// Number of deduplication tokens whose results are retained.
    pub dedup_cache_size: usize,
    /// Platform version bound into attestations.
    pub platform_version: u32,
    /// Journal file for the durable ledger. `None` keeps the ledger in memory.
    pub journal_path: Option<String>,
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            reference_policy: ReferencePolicy::default(),
            ledger_shards: constants::DEFAULT_LEDGER_SHARDS,
            tx_index_shards: constants::DEFAULT_TX_INDEX_SHARDS,
            max_concurrent_commits: constants::DEFAULT_MAX_CONCURRENT_COMMITS,
            dedup_cache_size: constants::DEFAULT_DEDUP_CACHE_SIZE,
            platform_version: constants::PLATFORM_VERSION,
            journal_path: None,
        }
    }
}

impl NotaryConfig {
    /// Reject values that would make the notary unusable.
    ///
    /// # Errors
    /// Returns [`NotaryError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("ledger_shards", self.ledger_shards),
            ("tx_index_shards", self.tx_index_shards),
            ("max_concurrent_commits", self.max_concurrent_commits),
            ("dedup_cache_size", self.dedup_cache_size),
        ];
        for (field, value) in checks {
            if value == 0 {
                return Err(NotaryError::Configuration(format!("{field} must be > 0")));
            }
        }
        Ok(())
    }
}
