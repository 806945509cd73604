//! Commit coordinator: the caller-facing entry point.
//!
//! Owns validation order and error translation. Checks run cheapest first
//! and every check before step 3 is free of ledger access:
//!
//! 1. Structural validation (disjoint inputs/references, unique inputs,
//!    non-empty transaction id)
//! 2. Request signature verification
//! 3. Uniqueness commit (the only ledger write)
//! 4. Attestation on `Committed`
//! 5. Structured `NotaryError::Rejected` on `Rejected`

use ed25519_dalek::SigningKey;
use notary_ledger::ConsumptionLedger;
use notary_types::{
    Attestation, CommitOutcome, CommitRequest, NotaryConfig, NotaryError, Party, RejectionReason,
    Result,
};
use notary_uniqueness::UniquenessService;

use crate::{
    attestation::AttestationSigner,
    signature::{Ed25519RequestVerifier, RequestVerifier},
};

/// Validates commit requests, runs them through the uniqueness service and
/// attests the ones that commit.
pub struct CommitCoordinator<L, V = Ed25519RequestVerifier> {
    uniqueness: UniquenessService<L>,
    verifier: V,
    signer: AttestationSigner,
}

impl<L: ConsumptionLedger> CommitCoordinator<L, Ed25519RequestVerifier> {
    /// Coordinator with ed25519 request verification.
    #[must_use]
    pub fn new(uniqueness: UniquenessService<L>, signer: AttestationSigner) -> Self {
        Self::with_verifier(uniqueness, Ed25519RequestVerifier, signer)
    }

    /// Build a coordinator over `ledger` from configuration.
    ///
    /// # Errors
    /// Returns `Configuration` if `config` is invalid.
    pub fn from_config(
        config: &NotaryConfig,
        ledger: L,
        name: impl Into<String>,
        key: SigningKey,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            UniquenessService::from_config(ledger, config),
            AttestationSigner::new(name, key, config.platform_version),
        ))
    }
}

impl<L: ConsumptionLedger, V: RequestVerifier> CommitCoordinator<L, V> {
    #[must_use]
    pub fn with_verifier(
        uniqueness: UniquenessService<L>,
        verifier: V,
        signer: AttestationSigner,
    ) -> Self {
        Self {
            uniqueness,
            verifier,
            signer,
        }
    }

    /// Commit `request` and return the authority's attestation.
    ///
    /// Blocks until the outcome is known.
    ///
    /// # Errors
    /// - `InvalidRequest` for structural violations (ledger untouched)
    /// - `Rejected(RequestSignatureInvalid)` if the signature does not verify
    ///   (ledger untouched)
    /// - `Rejected(..)` for every other rejection reason
    /// - ledger storage errors, after which nothing was recorded
    pub fn commit_input_states(&self, request: &CommitRequest) -> Result<Attestation> {
        let tx_id = request.tx_id;

        // 1. Structure
        request.validate_structure().inspect_err(|e| {
            tracing::debug!(tx_id = %tx_id, error = %e, "Commit request malformed");
        })?;

        // 2. Signature
        if let Err(reason) = self.verifier.verify(request) {
            tracing::warn!(
                tx_id = %tx_id,
                requester = %request.requester,
                reason = %reason,
                "Request signature invalid (caller or attacker error)"
            );
            return Err(NotaryError::Rejected(RejectionReason::RequestSignatureInvalid {
                reason,
            }));
        }

        // 3. Uniqueness
        match self.uniqueness.commit(request)? {
            // 4. Attest
            CommitOutcome::Committed => {
                let attestation = self.signer.sign(&tx_id);
                tracing::debug!(tx_id = %tx_id, by = %attestation.by, "Commit attested");
                Ok(attestation)
            }
            // 5. Reject
            CommitOutcome::Rejected(reason) => {
                tracing::debug!(tx_id = %tx_id, kind = reason.kind(), "Commit rejected");
                Err(NotaryError::Rejected(reason))
            }
        }
    }

    /// The authority's identity, as it appears on attestations.
    #[must_use]
    pub fn identity(&self) -> &Party {
        self.signer.identity()
    }

    /// The uniqueness service (and through it, read access to the ledger).
    #[must_use]
    pub fn uniqueness(&self) -> &UniquenessService<L> {
        &self.uniqueness
    }
}
