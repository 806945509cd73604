//! Request signature verification.
//!
//! The coordinator treats signatures as opaque: a [`RequestVerifier`] either
//! accepts the request's signature over its canonical payload or explains
//! why not. The default verifier is ed25519.

use notary_types::CommitRequest;

/// Checks that a request was authorized by its requester.
pub trait RequestVerifier: Send + Sync {
    /// `Err(reason)` if the signature does not prove the requester signed
    /// exactly this `(tx_id, inputs)`.
    fn verify(&self, request: &CommitRequest) -> Result<(), String>;
}

/// Ed25519 verification with strict (non-malleable) signature checking.
///
/// The signing key must be the requester's owning key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519RequestVerifier;

impl RequestVerifier for Ed25519RequestVerifier {
    fn verify(&self, request: &CommitRequest) -> Result<(), String> {
        let signature = &request.signature;
        if signature.by != request.requester.owning_key {
            return Err(format!(
                "signed by {}, not by requester {}",
                signature.by, request.requester
            ));
        }

        let key = signature.by.verifying_key().map_err(|e| e.to_string())?;
        let sig = ed25519_dalek::Signature::from_slice(&signature.bytes)
            .map_err(|e| format!("malformed signature: {e}"))?;
        key.verify_strict(&request.signing_payload(), &sig)
            .map_err(|e| format!("verification failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use notary_types::{RequestSignature, StateRef, TxId, test_signing_key};

    use super::*;

    fn request() -> CommitRequest {
        CommitRequest::signed(
            &test_signing_key(),
            "alice",
            TxId::from_label("B"),
            vec![StateRef::new(TxId::from_label("A"), 0)],
        )
    }

    #[test]
    fn valid_signature_accepted() {
        assert!(Ed25519RequestVerifier.verify(&request()).is_ok());
    }

    #[test]
    fn tampered_inputs_rejected() {
        let mut req = request();
        req.inputs.push(StateRef::new(TxId::from_label("A"), 1));
        let err = Ed25519RequestVerifier.verify(&req).unwrap_err();
        assert!(err.contains("verification failed"), "Got: {err}");
    }

    #[test]
    fn tampered_tx_id_rejected() {
        let mut req = request();
        req.tx_id = TxId::from_label("C");
        assert!(Ed25519RequestVerifier.verify(&req).is_err());
    }

    #[test]
    fn signature_by_other_key_rejected() {
        let mut req = request();
        let mallory = test_signing_key();
        req.signature = RequestSignature::sign(&mallory, &req.tx_id, &req.inputs);
        let err = Ed25519RequestVerifier.verify(&req).unwrap_err();
        assert!(err.contains("not by requester"), "Got: {err}");
    }

    #[test]
    fn truncated_signature_rejected() {
        let mut req = request();
        req.signature.bytes.truncate(10);
        let err = Ed25519RequestVerifier.verify(&req).unwrap_err();
        assert!(err.contains("malformed"), "Got: {err}");
    }
}
