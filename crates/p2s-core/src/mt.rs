use crate::block::B1Block;
use crate::errors::{CoreResult, MatchError, RevealError};
use crate::pht::{PartiallyHiddenTx, RevealSecret};
use crate::transaction::Transaction;
use p2s_crypto::{BlindingFactor, Commitment, HashFunctions};
use serde::{Serialize, Deserialize};
use std::collections::HashSet;

/// A revealed transaction: full fields plus the blinding factor, public once
/// included in a phase-2 block.
///
/// Must re-derive a commitment equal to exactly one hidden transaction in the
/// phase-1 block its phase-2 block references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingTx {
    pub transaction: Transaction,
    blinding: BlindingFactor,
}

impl MatchingTx {
    /// Re-derive the commitment this reveal opens.
    pub fn commitment(&self) -> CoreResult<Commitment> {
        let sensitive = self.transaction.sensitive_bytes()?;
        Ok(Commitment::commit(&sensitive, &self.blinding))
    }

    /// Hash over the full revealed payload, the phase-2 Merkle leaf.
    pub fn hash(&self) -> CoreResult<[u8; 32]> {
        let encoded = bincode::serialize(self)?;
        Ok(HashFunctions::sha3_256(&encoded))
    }

    /// Verify the sender signature carried by the revealed transaction.
    pub fn verify_signature(&self) -> bool {
        self.transaction.verify_signature()
    }
}

/// Open a hidden transaction with its reveal secret.
///
/// Reconstructs the full transaction, attaches the blinding factor, and
/// checks that re-committing reproduces the envelope's commitment exactly.
pub fn reveal(pht: &PartiallyHiddenTx, secret: &RevealSecret) -> Result<MatchingTx, RevealError> {
    let tx = secret.transaction();

    if tx.sender != pht.sender
        || tx.nonce != pht.nonce
        || tx.gas_limit != pht.gas_limit
        || tx.timestamp != pht.timestamp
    {
        return Err(RevealError::PublicFieldMismatch {
            commitment: pht.commitment.to_hex(),
        });
    }

    let sensitive = tx.sensitive_bytes().map_err(RevealError::Core)?;
    if !pht.commitment.verify(&sensitive, secret.blinding()) {
        return Err(RevealError::CommitmentMismatch {
            commitment: pht.commitment.to_hex(),
        });
    }

    Ok(MatchingTx {
        transaction: tx.clone(),
        blinding: secret.blinding().clone(),
    })
}

/// Locate the hidden transaction this reveal matches inside a phase-1 block.
///
/// Returns the matched index. `matched` holds the commitments already claimed
/// by earlier reveals in the same phase-2 block, so a second claim on the
/// same hidden transaction is refused.
pub fn check_against_b1(
    mt: &MatchingTx,
    b1: &B1Block,
    matched: &HashSet<Commitment>,
) -> Result<usize, MatchError> {
    let commitment = mt.commitment().map_err(MatchError::Core)?;

    let index = b1
        .phts
        .iter()
        .position(|pht| pht.commitment == commitment)
        .ok_or_else(|| MatchError::UnknownCommitment {
            commitment: commitment.to_hex(),
        })?;

    if matched.contains(&commitment) {
        return Err(MatchError::AlreadyMatched {
            commitment: commitment.to_hex(),
        });
    }

    // The commitment covers only the sensitive fields, so the reveal must
    // also restate the envelope's public fields exactly
    let pht = &b1.phts[index];
    let tx = &mt.transaction;
    if tx.sender != pht.sender
        || tx.nonce != pht.nonce
        || tx.gas_limit != pht.gas_limit
        || tx.timestamp != pht.timestamp
        || tx.sender_pubkey != pht.sender_pubkey
    {
        return Err(MatchError::EnvelopeMismatch {
            commitment: commitment.to_hex(),
        });
    }

    Ok(index)
}
