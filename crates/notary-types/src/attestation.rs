//! Authority attestations over committed transactions.
//!
//! An [`Attestation`] is the notary's binding signature proving that a
//! transaction was accepted as the unique consumer of its inputs. It is
//! produced only after a successful commit and can be checked by anyone
//! holding the authority's public key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{NotaryError, PublicKey, Result, TxId};

/// Domain separator for attestation payloads.
pub const ATTESTATION_PAYLOAD_DOMAIN: &[u8] = b"notary:attestation:v1:";

/// Signature scheme the authority signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureScheme {
    /// Ed25519 over SHA-512 (RFC 8032).
    Ed25519,
}

impl SignatureScheme {
    /// Numeric tag bound into signed payloads.
    #[must_use]
    pub fn scheme_id(self) -> u8 {
        match self {
            Self::Ed25519 => 4,
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519 => write!(f, "EDDSA_ED25519_SHA512"),
        }
    }
}

/// Metadata signed together with the transaction id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureMetadata {
    /// Platform version of the authority that signed.
    pub platform_version: u32,
    /// Scheme of the authority's key.
    pub scheme: SignatureScheme,
}

/// The authority's signature over a committed transaction id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// The committed transaction.
    pub tx_id: TxId,
    /// The authority's public key.
    pub by: PublicKey,
    /// Scheme and version bound into the signature.
    pub metadata: SignatureMetadata,
    /// Raw signature bytes.
    pub signature: Vec<u8>,
}

/// Canonical bytes the authority signs.
///
/// Format: `"notary:attestation:v1:" || scheme_id || platform_version LE || tx_id`
#[must_use]
pub fn attestation_signing_payload(tx_id: &TxId, metadata: &SignatureMetadata) -> Vec<u8> {
    let mut payload = Vec::with_capacity(ATTESTATION_PAYLOAD_DOMAIN.len() + 37);
    payload.extend_from_slice(ATTESTATION_PAYLOAD_DOMAIN);
    payload.push(metadata.scheme.scheme_id());
    payload.extend_from_slice(&metadata.platform_version.to_le_bytes());
    payload.extend_from_slice(tx_id.as_bytes());
    payload
}

impl Attestation {
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        attestation_signing_payload(&self.tx_id, &self.metadata)
    }

    /// Check the signature against `by`.
    ///
    /// # Errors
    /// Returns [`NotaryError::AttestationInvalid`] if the signature is
    /// malformed or does not verify, or [`NotaryError::InvalidPublicKey`] if
    /// `by` is not a valid key.
    pub fn verify(&self) -> Result<()> {
        let key = self.by.verifying_key()?;
        let signature = ed25519_dalek::Signature::from_slice(&self.signature)
            .map_err(|e| NotaryError::AttestationInvalid(e.to_string()))?;
        key.verify_strict(&self.signing_payload(), &signature)
            .map_err(|e| NotaryError::AttestationInvalid(e.to_string()))
    }
}
