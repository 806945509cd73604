//! The commit request submitted by a caller for uniqueness checking.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{NotaryError, Party, PublicKey, Result, StateRef, TimeWindow, TxId};

/// Domain separator for request signing payloads.
pub const REQUEST_PAYLOAD_DOMAIN: &[u8] = b"notary:commit-request:v1:";

/// Canonical bytes the requester signs.
///
/// Format: `"notary:commit-request:v1:" || tx_id || len(inputs) as u32 LE`
/// followed by `tx_id || index LE` for each input.
///
/// Inputs are encoded in request order; reordering inputs produces a
/// different payload.
#[must_use]
pub fn request_signing_payload(tx_id: &TxId, inputs: &[StateRef]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(REQUEST_PAYLOAD_DOMAIN.len() + 36 + inputs.len() * 36);
    payload.extend_from_slice(REQUEST_PAYLOAD_DOMAIN);
    payload.extend_from_slice(tx_id.as_bytes());
    let count = u32::try_from(inputs.len()).unwrap_or(u32::MAX);
    payload.extend_from_slice(&count.to_le_bytes());
    for input in inputs {
        payload.extend_from_slice(input.tx_id.as_bytes());
        payload.extend_from_slice(&input.index.to_le_bytes());
    }
    payload
}

/// Domain separator for request fingerprints.
const REQUEST_FINGERPRINT_DOMAIN: &[u8] = b"notary:commit-request-fingerprint:v1:";

/// Signature by the requester over [`request_signing_payload`].
///
/// Opaque bytes plus the key that claims to have produced them. Verified by
/// the commit coordinator, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSignature {
    /// The key that produced `bytes`.
    pub by: PublicKey,
    /// Raw signature bytes (64 for ed25519).
    pub bytes: Vec<u8>,
}

impl RequestSignature {
    /// Sign a request on behalf of the holder of `key`.
    #[must_use]
    pub fn sign(key: &ed25519_dalek::SigningKey, tx_id: &TxId, inputs: &[StateRef]) -> Self {
        use ed25519_dalek::Signer;
        let sig = key.sign(&request_signing_payload(tx_id, inputs));
        Self {
            by: key.verifying_key().into(),
            bytes: sig.to_bytes().to_vec(),
        }
    }
}

/// A transient request to consume `inputs` on behalf of `tx_id`.
///
/// Never persisted. Only the resulting consumption entries are durable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    /// States to be consumed, in transaction order.
    pub inputs: Vec<StateRef>,
    /// The transaction consuming them.
    pub tx_id: TxId,
    /// On whose behalf the commit is requested.
    pub requester: Party,
    /// Requester's signature over `(tx_id, inputs)`.
    pub signature: RequestSignature,
    /// When the commit is allowed to happen. `None` means any time.
    pub time_window: Option<TimeWindow>,
    /// States that must exist and not be stale, but are never consumed.
    pub references: Vec<StateRef>,
}

impl CommitRequest {
    /// Canonical bytes covered by `signature`.
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        request_signing_payload(&self.tx_id, &self.inputs)
    }

    /// Inputs as a set.
    #[must_use]
    pub fn input_set(&self) -> BTreeSet<StateRef> {
        self.inputs.iter().copied().collect()
    }

    /// References as a set. Duplicate references collapse silently.
    #[must_use]
    pub fn reference_set(&self) -> BTreeSet<StateRef> {
        self.references.iter().copied().collect()
    }

    /// SHA-256 over every field of the request: signing payload, requester,
    /// signature, time window and references.
    ///
    /// Two requests with the same fingerprint are the same submission.
    #[must_use]
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(REQUEST_FINGERPRINT_DOMAIN);
        hasher.update(self.signing_payload());
        hasher.update(self.requester.owning_key.0);
        hash_bytes(&mut hasher, self.requester.name.as_bytes());
        hasher.update(self.signature.by.0);
        hash_bytes(&mut hasher, &self.signature.bytes);
        match self.time_window {
            Some(window) => {
                hasher.update([1u8]);
                hash_instant(&mut hasher, window.from);
                hash_instant(&mut hasher, window.until);
            }
            None => hasher.update([0u8]),
        }
        let count = u32::try_from(self.references.len()).unwrap_or(u32::MAX);
        hasher.update(count.to_le_bytes());
        for reference in &self.references {
            hasher.update(reference.tx_id.as_bytes());
            hasher.update(reference.index.to_le_bytes());
        }
        hasher.finalize().into()
    }

    /// Structural checks that never need the ledger.
    ///
    /// - `tx_id` must not be all zeros
    /// - an input may not appear twice
    /// - no state may be both an input and a reference
    ///
    /// # Errors
    /// Returns [`NotaryError::InvalidRequest`] describing the first violation.
    pub fn validate_structure(&self) -> Result<()> {
        if self.tx_id.is_zero() {
            return Err(NotaryError::InvalidRequest {
                reason: "transaction id is empty".to_string(),
            });
        }

        let inputs = self.input_set();
        if inputs.len() != self.inputs.len() {
            return Err(NotaryError::InvalidRequest {
                reason: format!(
                    "{} duplicate input(s) in transaction {}",
                    self.inputs.len() - inputs.len(),
                    self.tx_id
                ),
            });
        }

        if let Some(overlap) = self.references.iter().find(|r| inputs.contains(r)) {
            return Err(NotaryError::InvalidRequest {
                reason: format!("state {overlap} is both an input and a reference"),
            });
        }

        Ok(())
    }
}

/// Length-prefixed so adjacent variable-length fields cannot alias.
fn hash_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    let len = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
    hasher.update(len.to_le_bytes());
    hasher.update(bytes);
}

fn hash_instant(hasher: &mut Sha256, instant: Option<DateTime<Utc>>) {
    match instant {
        Some(at) => {
            hasher.update([1u8]);
            hasher.update(at.timestamp().to_le_bytes());
            hasher.update(at.timestamp_subsec_nanos().to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
}

/// Signed request builder for unit tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl CommitRequest {
    /// Build a request with a valid signature from `key`, no time window and
    /// no references.
    pub fn signed(
        key: &ed25519_dalek::SigningKey,
        name: &str,
        tx_id: TxId,
        inputs: Vec<StateRef>,
    ) -> Self {
        let signature = RequestSignature::sign(key, &tx_id, &inputs);
        Self {
            requester: Party::new(name, key.verifying_key().into()),
            inputs,
            tx_id,
            signature,
            time_window: None,
            references: Vec::new(),
        }
    }

    /// Builder-style: attach a time window.
    #[must_use]
    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    /// Builder-style: attach reference states.
    #[must_use]
    pub fn with_references(mut self, references: Vec<StateRef>) -> Self {
        self.references = references;
        self
    }
}

/// Fresh random signing key for tests.
#[cfg(any(test, feature = "test-helpers"))]
pub fn test_signing_key() -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng)
}
