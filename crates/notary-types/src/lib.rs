//! # notary-types
//!
//! Shared types, errors, and configuration for the uniqueness **Notary**.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`TxId`], [`StateRef`], [`PublicKey`], [`Party`], [`DedupToken`]
//! - **Request model**: [`CommitRequest`], [`RequestSignature`], [`TimeWindow`]
//! - **Ledger rows**: [`ConsumingEntry`]
//! - **Outcomes**: [`CommitOutcome`], [`RejectionReason`]
//! - **Attestations**: [`Attestation`], [`SignatureMetadata`], [`SignatureScheme`]
//! - **Configuration**: [`NotaryConfig`], [`ReferencePolicy`]
//! - **Errors**: [`NotaryError`] with `NT_ERR_` prefix codes
//! - **Constants**: system-wide defaults

pub mod attestation;
pub mod config;
pub mod constants;
pub mod entry;
pub mod error;
pub mod ids;
pub mod outcome;
pub mod request;
pub mod time_window;

pub use attestation::*;
pub use config::*;
pub use entry::*;
pub use error::*;
pub use ids::*;
pub use outcome::*;
pub use request::*;
pub use time_window::*;

// Constants are accessed via `notary_types::constants::FOO`
// (not re-exported to avoid name collisions).
