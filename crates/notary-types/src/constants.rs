//! System-wide constants for the uniqueness notary.

/// Default number of consumption ledger shards. Must be non-zero.
pub const DEFAULT_LEDGER_SHARDS: usize = 64;

/// Default number of shards for the transaction-id index.
pub const DEFAULT_TX_INDEX_SHARDS: usize = 16;

/// Default upper bound on commits executing concurrently in the dispatch pool.
pub const DEFAULT_MAX_CONCURRENT_COMMITS: usize = 32;

/// Default number of deduplication tokens whose results are retained.
pub const DEFAULT_DEDUP_CACHE_SIZE: usize = 100_000;

/// Platform version bound into attestations.
pub const PLATFORM_VERSION: u32 = 1;
