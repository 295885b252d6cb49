use crate::errors::{CoreError, CoreResult};
use crate::transaction::Transaction;
use p2s_crypto::{derive_address, BlindingFactor, Commitment, CryptoError, SphincsKeypair, SphincsPublicKey, SphincsSignature, SphincsSignatureScheme};
use serde::{Serialize, Deserialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The private half of a hidden transaction: the full signed transaction plus
/// the blinding factor that opens its commitment.
///
/// Retained by the originator until reveal time or window expiry. Losing it
/// before reveal is equivalent to a missed reveal. The blinding factor is
/// zeroized on drop.
#[derive(Debug, Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct RevealSecret {
    #[zeroize(skip)]
    transaction: Transaction,
    blinding: BlindingFactor,
}

impl RevealSecret {
    pub fn new(transaction: Transaction, blinding: BlindingFactor) -> Self {
        Self { transaction, blinding }
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn blinding(&self) -> &BlindingFactor {
        &self.blinding
    }

    /// Re-derive the commitment this secret opens.
    pub fn commitment(&self) -> CoreResult<Commitment> {
        let sensitive = self.transaction.sensitive_bytes()?;
        Ok(Commitment::commit(&sensitive, &self.blinding))
    }
}

/// Public envelope of a partially hidden transaction.
///
/// Carries only the non-sensitive fields and the commitment; recipient,
/// value and call data stay unrecoverable until the matching reveal. The
/// sender signature covers the public fields plus the commitment, so an
/// envelope cannot be re-bound to a different commitment after submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartiallyHiddenTx {
    pub sender: String,
    pub nonce: u64,
    pub gas_limit: u64,
    pub timestamp: i64,
    pub commitment: Commitment,
    pub sender_pubkey: SphincsPublicKey,
    pub signature: SphincsSignature,
}

impl PartiallyHiddenTx {
    /// Canonical signing encoding: public fields plus commitment.
    pub fn envelope_bytes(&self) -> CoreResult<Vec<u8>> {
        envelope_bytes(&self.sender, self.nonce, self.gas_limit, self.timestamp, &self.commitment)
    }

    /// Check envelope well-formedness: the claimed sender address belongs to
    /// the attached public key and the signature covers the envelope.
    pub fn verify_envelope(&self) -> bool {
        if derive_address(&self.sender_pubkey) != self.sender {
            return false;
        }

        let payload = match self.envelope_bytes() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        SphincsSignatureScheme::verify(&payload, &self.signature, &self.sender_pubkey).is_ok()
    }

    /// Approximate wire size, used for block payload budgeting.
    pub fn encoded_len(&self) -> CoreResult<usize> {
        let len = bincode::serialized_size(self)?;
        Ok(len as usize)
    }
}

fn envelope_bytes(
    sender: &str,
    nonce: u64,
    gas_limit: u64,
    timestamp: i64,
    commitment: &Commitment,
) -> CoreResult<Vec<u8>> {
    let bytes = bincode::serialize(&(sender, nonce, gas_limit, timestamp, commitment))?;
    Ok(bytes)
}

/// Split a signed transaction into a public envelope and a reveal secret.
///
/// Generates a fresh blinding factor per call, so hiding the same payload
/// twice yields unlinkable commitments. The signing keypair must belong to
/// the transaction's sender.
pub fn build_pht(
    transaction: &Transaction,
    keypair: &SphincsKeypair,
) -> CoreResult<(PartiallyHiddenTx, RevealSecret)> {
    let signer = keypair.address();
    if signer != transaction.sender {
        return Err(CoreError::SenderMismatch {
            expected: transaction.sender.clone(),
            got: signer,
        });
    }

    if !transaction.verify_signature() {
        return Err(CoreError::Crypto(CryptoError::SignatureVerificationFailed(
            "transaction signature invalid".to_string(),
        )));
    }

    let blinding = BlindingFactor::random();
    let sensitive = transaction.sensitive_bytes()?;
    let commitment = Commitment::commit(&sensitive, &blinding);

    let payload = envelope_bytes(
        &transaction.sender,
        transaction.nonce,
        transaction.gas_limit,
        transaction.timestamp,
        &commitment,
    )?;
    let signature = keypair.sign(&payload)?;

    let pht = PartiallyHiddenTx {
        sender: transaction.sender.clone(),
        nonce: transaction.nonce,
        gas_limit: transaction.gas_limit,
        timestamp: transaction.timestamp,
        commitment,
        sender_pubkey: keypair.public.clone(),
        signature,
    };

    let secret = RevealSecret::new(transaction.clone(), blinding);

    Ok((pht, secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::tests::test_keypair;

    fn create_test_transaction() -> Transaction {
        Transaction::new(test_keypair(), "0xfeedfacecafebeef00112233445566778899aabb", 1_000, b"sensitive calldata bytes".to_vec(), 7, 50_000).unwrap()
    }

    fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_build_pht_produces_verifiable_envelope() {
        let tx = create_test_transaction();
        let (pht, secret) = build_pht(&tx, test_keypair()).unwrap();

        assert!(pht.verify_envelope());
        assert_eq!(secret.commitment().unwrap(), pht.commitment);
    }

    #[test]
    fn test_envelope_hides_sensitive_fields() {
        let tx = create_test_transaction();
        let (pht, _) = build_pht(&tx, test_keypair()).unwrap();

        let encoded = bincode::serialize(&pht).unwrap();
        assert!(!contains_subslice(&encoded, tx.recipient.as_bytes()));
        assert!(!contains_subslice(&encoded, &tx.call_data[..]));
    }

    #[test]
    fn test_repeat_hiding_is_unlinkable() {
        let tx = create_test_transaction();
        let (pht1, _) = build_pht(&tx, test_keypair()).unwrap();
        let (pht2, _) = build_pht(&tx, test_keypair()).unwrap();

        assert_ne!(pht1.commitment, pht2.commitment);
    }

    #[test]
    fn test_tampered_envelope_fails_verification() {
        let tx = create_test_transaction();
        let (mut pht, _) = build_pht(&tx, test_keypair()).unwrap();
        pht.nonce += 1;

        assert!(!pht.verify_envelope());
    }

    #[test]
    fn test_rebound_commitment_fails_verification() {
        let tx = create_test_transaction();
        let (mut pht, _) = build_pht(&tx, test_keypair()).unwrap();
        pht.commitment = Commitment::from_bytes([0x42; 32]);

        assert!(!pht.verify_envelope());
    }

    #[test]
    fn test_wrong_keypair_is_rejected() {
        let tx = create_test_transaction();
        let other = SphincsKeypair::generate().unwrap();

        let result = build_pht(&tx, &other);
        assert!(matches!(result, Err(CoreError::SenderMismatch { .. })));
    }

    #[test]
    fn test_envelope_size_accounting() {
        let tx = create_test_transaction();
        let (pht, _) = build_pht(&tx, test_keypair()).unwrap();

        let len = pht.encoded_len().unwrap();
        assert_eq!(len, bincode::serialize(&pht).unwrap().len());
    }
}
