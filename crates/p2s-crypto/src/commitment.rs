// Commitment codec.
//
// Binding, hiding commitments over the sensitive fields of a transaction.
// A commitment is a domain-separated SHA3-256 digest over the canonical
// sensitive-field encoding plus a locally generated blinding factor. The
// blinding factor never appears in any public envelope; publishing it is
// what turns a hidden transaction into a revealed one.
//
// SAFETY GUARANTEES:
// - Deterministic: same fields + same blinding always reproduce the digest
// - Binding: changing any committed byte changes the digest
// - Hiding: equal field values under different blinding factors are unlinkable
// - Verification is pure and side-effect-free (returns bool, never panics)

use serde::{Serialize, Deserialize};
use sha3::{Digest, Sha3_256};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Domain tag separating commitment digests from every other SHA3 use in the
/// protocol (seeds, block hashes, signing payloads).
const COMMITMENT_DOMAIN: &[u8] = b"p2s/commitment/v1";

/// Byte length of a blinding factor.
pub const BLINDING_FACTOR_BYTES: usize = 32;

// ==================== BLINDING FACTOR ====================

/// Secret blinding factor mixed into a commitment.
///
/// Generated once per transaction by the originator and retained (together
/// with the sensitive fields) until reveal time. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct BlindingFactor {
    bytes: [u8; BLINDING_FACTOR_BYTES],
}

impl BlindingFactor {
    /// Generate a fresh random blinding factor from the OS RNG.
    pub fn random() -> Self {
        use rand::rngs::OsRng;
        use rand::RngCore;

        let mut bytes = [0u8; BLINDING_FACTOR_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Reconstruct a blinding factor from stored bytes.
    pub fn from_bytes(bytes: [u8; BLINDING_FACTOR_BYTES]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; BLINDING_FACTOR_BYTES] {
        &self.bytes
    }
}

impl fmt::Debug for BlindingFactor {
    // Secret material stays out of logs and panic messages
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlindingFactor(<{} bytes hidden>)", BLINDING_FACTOR_BYTES)
    }
}

// ==================== COMMITMENT ====================

/// A binding, hiding digest over sensitive transaction fields.
///
/// One commitment per transaction; immutable once created. Used as the
/// pairing key between a hidden transaction and its later reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment {
    hash: [u8; 32],
}

impl Commitment {
    /// Commit to `sensitive_bytes` under `blinding`.
    ///
    /// Deterministic and collision-resistant: the digest covers a fixed
    /// domain tag, the length-prefixed sensitive encoding, and the blinding
    /// factor, so no two distinct inputs share an encoding.
    pub fn commit(sensitive_bytes: &[u8], blinding: &BlindingFactor) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(COMMITMENT_DOMAIN);
        hasher.update((sensitive_bytes.len() as u64).to_le_bytes());
        hasher.update(sensitive_bytes);
        hasher.update(blinding.as_bytes());
        let hash_result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&hash_result);

        Self { hash }
    }

    /// True iff re-committing the revealed bytes under `blinding` reproduces
    /// this digest exactly. Mismatch is an ordinary `false`; the caller
    /// decides rejection.
    pub fn verify(&self, revealed_bytes: &[u8], blinding: &BlindingFactor) -> bool {
        Self::commit(revealed_bytes, blinding).hash == self.hash
    }

    /// Reconstruct a commitment from its digest bytes.
    pub fn from_bytes(hash: [u8; 32]) -> Self {
        Self { hash }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Hex rendering for logs and error messages.
    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_commit_is_deterministic() {
        let blinding = BlindingFactor::from_bytes([7u8; 32]);

        let c1 = Commitment::commit(b"recipient|value|calldata", &blinding);
        let c2 = Commitment::commit(b"recipient|value|calldata", &blinding);

        assert_eq!(c1, c2);
    }

    #[test]
    fn test_commit_changes_with_blinding() {
        let b1 = BlindingFactor::from_bytes([1u8; 32]);
        let b2 = BlindingFactor::from_bytes([2u8; 32]);

        let c1 = Commitment::commit(b"same payload", &b1);
        let c2 = Commitment::commit(b"same payload", &b2);

        assert_ne!(c1, c2);
    }

    #[test]
    fn test_commit_changes_with_payload() {
        let blinding = BlindingFactor::from_bytes([9u8; 32]);

        let c1 = Commitment::commit(b"payload a", &blinding);
        let c2 = Commitment::commit(b"payload b", &blinding);

        assert_ne!(c1, c2);
    }

    #[test]
    fn test_verify_accepts_matching_reveal() {
        let blinding = BlindingFactor::random();
        let commitment = Commitment::commit(b"hidden fields", &blinding);

        assert!(commitment.verify(b"hidden fields", &blinding));
    }

    #[test]
    fn test_verify_rejects_wrong_payload() {
        let blinding = BlindingFactor::random();
        let commitment = Commitment::commit(b"hidden fields", &blinding);

        assert!(!commitment.verify(b"forged fields", &blinding));
    }

    #[test]
    fn test_verify_rejects_wrong_blinding() {
        let blinding = BlindingFactor::random();
        let commitment = Commitment::commit(b"hidden fields", &blinding);

        assert!(!commitment.verify(b"hidden fields", &BlindingFactor::random()));
    }

    #[test]
    fn test_equal_payloads_are_unlinkable() {
        // Two senders hiding identical values must not produce equal digests
        let c1 = Commitment::commit(b"recipient=0xabc value=100", &BlindingFactor::random());
        let c2 = Commitment::commit(b"recipient=0xabc value=100", &BlindingFactor::random());

        assert_ne!(c1, c2);
    }

    #[test]
    fn test_length_prefix_prevents_boundary_shift() {
        // Moving a byte between payload and blinding must not collide
        let b1 = BlindingFactor::from_bytes([0u8; 32]);
        let mut shifted = [0u8; 32];
        shifted[0] = 0xaa;
        let b2 = BlindingFactor::from_bytes(shifted);

        let c1 = Commitment::commit(&[0xaa], &b1);
        let c2 = Commitment::commit(&[], &b2);

        assert_ne!(c1, c2);
    }

    #[test]
    fn test_hex_roundtrip() {
        let commitment = Commitment::commit(b"x", &BlindingFactor::random());
        let hex = commitment.to_hex();

        assert_eq!(hex.len(), 64);
        assert_eq!(format!("{}", commitment), hex);
    }

    proptest! {
        #[test]
        fn prop_binding_across_blindings(
            payload in proptest::collection::vec(any::<u8>(), 0..256),
            a in any::<[u8; 32]>(),
            b in any::<[u8; 32]>(),
        ) {
            prop_assume!(a != b);
            let ca = Commitment::commit(&payload, &BlindingFactor::from_bytes(a));
            let cb = Commitment::commit(&payload, &BlindingFactor::from_bytes(b));
            prop_assert_ne!(ca, cb);
        }

        #[test]
        fn prop_verify_rejects_any_flipped_byte(
            payload in proptest::collection::vec(any::<u8>(), 1..256),
            blinding in any::<[u8; 32]>(),
            flip_at in any::<usize>(),
            flip_with in 1u8..=255,
        ) {
            let blinding = BlindingFactor::from_bytes(blinding);
            let commitment = Commitment::commit(&payload, &blinding);

            let mut altered = payload.clone();
            let idx = flip_at % altered.len();
            altered[idx] ^= flip_with;

            prop_assert!(!commitment.verify(&altered, &blinding));
            prop_assert!(commitment.verify(&payload, &blinding));
        }
    }
}
