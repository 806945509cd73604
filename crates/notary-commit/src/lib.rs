//! # notary-commit
//!
//! **Commit Protocol**: the caller-facing entry point of the notary.
//!
//! ## Architecture
//!
//! 1. **CommitCoordinator**: validates structure, verifies the request
//!    signature, runs the uniqueness commit, requests an attestation
//! 2. **RequestVerifier**: checks the requester's signature over the
//!    canonical request payload before the ledger is touched
//! 3. **AttestationSigner**: the authority's signature over a committed
//!    transaction id
//! 4. **CommitBridge**: dispatches commits as asynchronous units of work
//!    keyed by a deduplication token, so thousands of suspended callers share
//!    a bounded worker pool
//!
//! ## Commit Flow
//!
//! ```text
//! caller → CommitBridge.submit() → CommitCoordinator.commit_input_states()
//!     → validate_structure → RequestVerifier.verify → UniquenessService.commit
//!     → AttestationSigner.sign → Attestation → caller resumes
//! ```
//!
//! A rejected request surfaces as `NotaryError::Rejected(reason)` and never
//! receives an attestation.

pub mod attestation;
pub mod bridge;
pub mod coordinator;
pub mod signature;

pub use attestation::AttestationSigner;
pub use bridge::{CommitBridge, CommitHandle};
pub use coordinator::CommitCoordinator;
pub use signature::{Ed25519RequestVerifier, RequestVerifier};
