//! # notary-uniqueness
//!
//! **Uniqueness Service**: turns a commit request into a [`CommitOutcome`]
//! by consulting the consumption ledger exactly once, atomically.
//!
//! ## Algorithm
//!
//! 1. Validate the time window against the [`Clock`] (no ledger access)
//! 2. `record_if_absent_referencing(inputs, references, ..)`, the single
//!    write; under [`ReferencePolicy::RejectStale`] references are checked
//!    in the same critical section as the inputs
//! 3. Translate the ledger result: conflicts owned entirely by the
//!    requesting transaction are an idempotent retry and count as committed
//!
//! [`CommitOutcome`]: notary_types::CommitOutcome
//! [`ReferencePolicy::RejectStale`]: notary_types::ReferencePolicy::RejectStale

pub mod clock;
pub mod service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use service::UniquenessService;
