//! The authority's attestation signer.

use ed25519_dalek::{Signer, SigningKey};
use notary_types::{
    Attestation, Party, PublicKey, SignatureMetadata, SignatureScheme, TxId,
    attestation_signing_payload,
};

/// Signs committed transaction ids with the authority's identity key.
///
/// Pure function of `(tx_id, key)`. Must only be invoked once the commit
/// succeeded; the coordinator enforces that ordering.
pub struct AttestationSigner {
    key: SigningKey,
    identity: Party,
    metadata: SignatureMetadata,
}

impl AttestationSigner {
    #[must_use]
    pub fn new(name: impl Into<String>, key: SigningKey, platform_version: u32) -> Self {
        let identity = Party::new(name, key.verifying_key().into());
        Self {
            key,
            identity,
            metadata: SignatureMetadata {
                platform_version,
                scheme: SignatureScheme::Ed25519,
            },
        }
    }

    /// The authority's identity.
    #[must_use]
    pub fn identity(&self) -> &Party {
        &self.identity
    }

    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.identity.owning_key
    }

    /// Sign `tx_id`.
    #[must_use]
    pub fn sign(&self, tx_id: &TxId) -> Attestation {
        let signature = self.key.sign(&attestation_signing_payload(tx_id, &self.metadata));
        Attestation {
            tx_id: *tx_id,
            by: self.identity.owning_key,
            metadata: self.metadata,
            signature: signature.to_bytes().to_vec(),
        }
    }
}

impl std::fmt::Debug for AttestationSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttestationSigner")
            .field("identity", &self.identity)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use notary_types::test_signing_key;

    use super::*;

    #[test]
    fn attestation_verifies() {
        let signer = AttestationSigner::new("notary", test_signing_key(), 3);
        let att = signer.sign(&TxId::from_label("B"));
        assert_eq!(att.tx_id, TxId::from_label("B"));
        assert_eq!(att.by, signer.public_key());
        assert_eq!(att.metadata.platform_version, 3);
        assert_eq!(att.metadata.scheme, SignatureScheme::Ed25519);
        att.verify().unwrap();
    }

    #[test]
    fn attestation_is_deterministic() {
        let signer = AttestationSigner::new("notary", test_signing_key(), 1);
        let tx = TxId::from_label("B");
        assert_eq!(signer.sign(&tx), signer.sign(&tx));
    }

    #[test]
    fn moved_attestation_fails_verification() {
        let signer = AttestationSigner::new("notary", test_signing_key(), 1);
        let mut att = signer.sign(&TxId::from_label("B"));
        att.tx_id = TxId::from_label("C");
        assert!(att.verify().is_err());
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = test_signing_key();
        let secret = hex::encode(key.to_bytes());
        let signer = AttestationSigner::new("notary", key, 1);
        assert!(!format!("{signer:?}").contains(&secret));
    }
}
