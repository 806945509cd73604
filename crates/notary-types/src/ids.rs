//! Identifiers used throughout the notary.
//!
//! Transaction identifiers are SHA-256 digests. State references point at one
//! output of a prior transaction. Parties are identified by their ed25519
//! public key. Deduplication tokens use UUIDv7.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::NotaryError;

// ---------------------------------------------------------------------------
// TxId
// ---------------------------------------------------------------------------

/// Fixed-size cryptographic digest naming a transaction.
///
/// Serialized as a 64-character lowercase hex string so it can be used as a
/// JSON map key and in journal lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TxId(pub [u8; 32]);

impl TxId {
    /// The all-zero identifier. Never a valid transaction id.
    pub const ZERO: Self = Self([0u8; 32]);

    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// SHA-256 of arbitrary transaction content.
    #[must_use]
    pub fn digest(content: &[u8]) -> Self {
        let hash = Sha256::digest(content);
        Self(hash.into())
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// First four bytes in hex, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for TxId {
    type Err = NotaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|e| NotaryError::Serialization(format!("TxId: {e}")))?;
        let bytes: [u8; 32] = raw.try_into().map_err(|v: Vec<u8>| {
            NotaryError::Serialization(format!("TxId: expected 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(bytes))
    }
}

impl From<TxId> for String {
    fn from(id: TxId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for TxId {
    type Error = NotaryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ---------------------------------------------------------------------------
// StateRef
// ---------------------------------------------------------------------------

/// Pointer to one output of a prior transaction.
///
/// Used both as an *input* (to be consumed) and as a *reference* (must not be
/// stale, never consumed). Equality and ordering are structural; the ordering
/// is the canonical order used for lock acquisition and payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StateRef {
    /// The transaction that produced the state.
    pub tx_id: TxId,
    /// Output index within that transaction.
    pub index: u32,
}

impl StateRef {
    #[must_use]
    pub fn new(tx_id: TxId, index: u32) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.index)
    }
}

impl FromStr for StateRef {
    type Err = NotaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tx, index) = s
            .rsplit_once(':')
            .ok_or_else(|| NotaryError::Serialization(format!("StateRef: missing index in {s}")))?;
        let index = index
            .parse::<u32>()
            .map_err(|e| NotaryError::Serialization(format!("StateRef index: {e}")))?;
        Ok(Self::new(tx.parse()?, index))
    }
}

impl From<StateRef> for String {
    fn from(r: StateRef) -> Self {
        r.to_string()
    }
}

impl TryFrom<String> for StateRef {
    type Error = NotaryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ---------------------------------------------------------------------------
// PublicKey / Party
// ---------------------------------------------------------------------------

/// Raw ed25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Decode into a dalek verifying key.
    ///
    /// # Errors
    /// Returns [`NotaryError::InvalidPublicKey`] if the bytes are not a valid
    /// curve point.
    pub fn verifying_key(&self) -> crate::Result<ed25519_dalek::VerifyingKey> {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0)
            .map_err(|e| NotaryError::InvalidPublicKey(e.to_string()))
    }

    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<ed25519_dalek::VerifyingKey> for PublicKey {
    fn from(key: ed25519_dalek::VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", hex::encode(&self.0[..8]))
    }
}

/// A public-key-backed identity: the requester of a commit, or the notary
/// authority itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    /// Human-readable name, for audit only.
    pub name: String,
    /// The key that signs on behalf of this party.
    pub owning_key: PublicKey,
}

impl Party {
    #[must_use]
    pub fn new(name: impl Into<String>, owning_key: PublicKey) -> Self {
        Self {
            name: name.into(),
            owning_key,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.owning_key.short())
    }
}

// ---------------------------------------------------------------------------
// DedupToken
// ---------------------------------------------------------------------------

/// Identifies one asynchronous commit dispatch. Redelivering the same token
/// attaches to the original dispatch instead of executing it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DedupToken(pub Uuid);

impl DedupToken {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Deterministic token for a request: the same transaction submitted by
    /// the same requester always maps to the same token.
    #[must_use]
    pub fn for_request(tx_id: &TxId, requester: &Party) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"notary:dedup:v1:");
        hasher.update(tx_id.as_bytes());
        hasher.update(requester.owning_key.as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hash[..16]);
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for DedupToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DedupToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dedup:{}", self.0)
    }
}

/// Deterministic fixtures. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl TxId {
    /// Transaction id derived from a short label, e.g. `TxId::from_label("A")`.
    pub fn from_label(label: &str) -> Self {
        Self::digest(format!("notary:test-tx:{label}").as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_id_digest_deterministic() {
        assert_eq!(TxId::digest(b"abc"), TxId::digest(b"abc"));
        assert_ne!(TxId::digest(b"abc"), TxId::digest(b"abd"));
        assert!(!TxId::digest(b"abc").is_zero());
        assert!(TxId::ZERO.is_zero());
    }

    #[test]
    fn tx_id_hex_parse() {
        let id = TxId::from_label("A");
        let parsed: TxId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("abcd".parse::<TxId>().is_err());
        assert!("zz".parse::<TxId>().is_err());
    }

    #[test]
    fn state_ref_display_and_parse() {
        let r = StateRef::new(TxId::from_label("A"), 7);
        let s = r.to_string();
        assert!(s.ends_with(":7"), "Got: {s}");
        assert_eq!(s.parse::<StateRef>().unwrap(), r);
        assert!("nocolon".parse::<StateRef>().is_err());
    }

    #[test]
    fn state_ref_orders_by_tx_then_index() {
        let tx = TxId::from_bytes([1u8; 32]);
        let a = StateRef::new(tx, 0);
        let b = StateRef::new(tx, 1);
        let c = StateRef::new(TxId::from_bytes([2u8; 32]), 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn state_ref_usable_as_json_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(StateRef::new(TxId::from_label("A"), 0), TxId::from_label("B"));
        let json = serde_json::to_string(&map).unwrap();
        let back: std::collections::BTreeMap<StateRef, TxId> = serde_json::from_str(&json).unwrap();
        assert_eq!(map, back);
    }

    #[test]
    fn dedup_token_for_request_is_stable() {
        let party = Party::new("alice", PublicKey([3u8; 32]));
        let tx = TxId::from_label("T");
        assert_eq!(
            DedupToken::for_request(&tx, &party),
            DedupToken::for_request(&tx, &party)
        );
        assert_ne!(
            DedupToken::for_request(&tx, &party),
            DedupToken::for_request(&TxId::from_label("U"), &party)
        );
        assert_ne!(DedupToken::new(), DedupToken::new());
    }

    #[test]
    fn invalid_public_key_rejected() {
        // Not every 32-byte string decompresses to a curve point.
        let bad = (0u8..=255)
            .map(|b| PublicKey([b; 32]))
            .find(|k| k.verifying_key().is_err());
        assert!(bad.is_some());
    }
}
