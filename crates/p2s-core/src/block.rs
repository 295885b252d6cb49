use crate::errors::{CoreError, CoreResult};
use crate::mt::MatchingTx;
use crate::pht::PartiallyHiddenTx;
use chrono::Utc;
use p2s_crypto::{derive_address, payload_root, HashFunctions, SphincsKeypair, SphincsPublicKey, SphincsSignature, SphincsSignatureScheme};
use serde::{Serialize, Deserialize};

// Domain tags keep the two phases' headers disjoint, for hashing and
// signing alike: a signature over a phase-1 header can never double as a
// signature over a phase-2 header with the same fields.
const B1_HEADER_DOMAIN: &[u8] = b"p2s/b1/v1";
const B2_HEADER_DOMAIN: &[u8] = b"p2s/b2/v1";

/// Which phase a header belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockPhase {
    B1,
    B2,
}

impl BlockPhase {
    fn domain(self) -> &'static [u8] {
        match self {
            BlockPhase::B1 => B1_HEADER_DOMAIN,
            BlockPhase::B2 => B2_HEADER_DOMAIN,
        }
    }
}

/// Lifecycle of a phase-1 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum B1Status {
    Proposed,
    Finalized,
    Rejected,
}

impl B1Status {
    /// Explicit transition function; anything not listed is refused.
    pub fn advance(self, next: B1Status) -> CoreResult<B1Status> {
        match (self, next) {
            (B1Status::Proposed, B1Status::Finalized) => Ok(next),
            (B1Status::Proposed, B1Status::Rejected) => Ok(next),
            (from, to) => Err(CoreError::InvalidTransition {
                from: format!("{:?}", from),
                to: format!("{:?}", to),
            }),
        }
    }
}

/// Lifecycle of a phase-2 pairing slot.
///
/// `Rejected` covers a candidate block that failed validation; the slot
/// reopens to `AwaitingReveal` while the window lasts. `TimedOut` is the
/// terminal state when the window closes without a finalized phase-2 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum B2Status {
    AwaitingReveal,
    Proposed,
    Finalized,
    TimedOut,
    Rejected,
}

impl B2Status {
    pub fn advance(self, next: B2Status) -> CoreResult<B2Status> {
        match (self, next) {
            (B2Status::AwaitingReveal, B2Status::Proposed) => Ok(next),
            (B2Status::AwaitingReveal, B2Status::TimedOut) => Ok(next),
            (B2Status::Proposed, B2Status::Finalized) => Ok(next),
            (B2Status::Proposed, B2Status::Rejected) => Ok(next),
            (B2Status::Proposed, B2Status::TimedOut) => Ok(next),
            (B2Status::Rejected, B2Status::AwaitingReveal) => Ok(next),
            (B2Status::Rejected, B2Status::TimedOut) => Ok(next),
            (from, to) => Err(CoreError::InvalidTransition {
                from: format!("{:?}", from),
                to: format!("{:?}", to),
            }),
        }
    }
}

/// Lifecycle of a single hidden transaction.
///
/// `RevealedViaB2` and `MissedReveal` are terminal. A missed reveal never
/// returns to the pending pool; the originator must resubmit with a fresh
/// commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhtStatus {
    Pending,
    InB1,
    RevealedViaB2,
    MissedReveal,
}

impl PhtStatus {
    pub fn advance(self, next: PhtStatus) -> CoreResult<PhtStatus> {
        match (self, next) {
            (PhtStatus::Pending, PhtStatus::InB1) => Ok(next),
            // B1 rejected: envelopes go back to the pool
            (PhtStatus::InB1, PhtStatus::Pending) => Ok(next),
            (PhtStatus::InB1, PhtStatus::RevealedViaB2) => Ok(next),
            (PhtStatus::InB1, PhtStatus::MissedReveal) => Ok(next),
            (from, to) => Err(CoreError::InvalidTransition {
                from: format!("{:?}", from),
                to: format!("{:?}", to),
            }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PhtStatus::RevealedViaB2 | PhtStatus::MissedReveal)
    }
}

/// Phase-1 block: an ordered sequence of hidden transactions.
///
/// The header commits to the payload through the Merkle root over the
/// envelope commitments; the proposer signature covers the phase-tagged
/// header only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct B1Block {
    pub round: u64,
    pub height: u64,
    pub parent_hash: [u8; 32],
    pub proposer: String,
    pub commitment_root: [u8; 32],
    pub timestamp: i64,
    pub phts: Vec<PartiallyHiddenTx>,
    pub proposer_pubkey: SphincsPublicKey,
    pub signature: SphincsSignature,
}

impl B1Block {
    /// Build and sign a phase-1 block over the given envelopes.
    pub fn new(
        round: u64,
        height: u64,
        parent_hash: [u8; 32],
        phts: Vec<PartiallyHiddenTx>,
        keypair: &SphincsKeypair,
    ) -> CoreResult<Self> {
        let proposer = keypair.address();
        let timestamp = Utc::now().timestamp();
        let commitment_root = commitment_root_of(&phts);

        let header = header_bytes(round, height, &parent_hash, &proposer, &commitment_root, timestamp)?;
        let signature = keypair.sign(&tagged_header(BlockPhase::B1, &header))?;

        Ok(Self {
            round,
            height,
            parent_hash,
            proposer,
            commitment_root,
            timestamp,
            phts,
            proposer_pubkey: keypair.public.clone(),
            signature,
        })
    }

    /// Block identifier: SHA3 over the tagged header encoding.
    pub fn hash(&self) -> CoreResult<[u8; 32]> {
        let header = self.header_bytes()?;
        Ok(HashFunctions::sha3_256(&tagged_header(BlockPhase::B1, &header)))
    }

    pub fn header_bytes(&self) -> CoreResult<Vec<u8>> {
        header_bytes(
            self.round,
            self.height,
            &self.parent_hash,
            &self.proposer,
            &self.commitment_root,
            self.timestamp,
        )
    }

    /// Verify the proposer signature over the tagged header.
    pub fn verify_signature(&self) -> bool {
        if derive_address(&self.proposer_pubkey) != self.proposer {
            return false;
        }

        let header = match self.header_bytes() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        verify_header_signature(BlockPhase::B1, &header, &self.signature, &self.proposer_pubkey)
    }

    /// Recompute the Merkle root over the payload commitments.
    pub fn compute_commitment_root(&self) -> [u8; 32] {
        commitment_root_of(&self.phts)
    }

    /// Encoded payload size, for block size bounds.
    pub fn payload_len(&self) -> CoreResult<usize> {
        let len = bincode::serialized_size(&self.phts)?;
        Ok(len as usize)
    }
}

/// Phase-2 block: the ordered reveals paired to one finalized phase-1 block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct B2Block {
    pub round: u64,
    pub height: u64,
    /// Hash of the finalized phase-1 block this block reveals
    pub b1_hash: [u8; 32],
    pub proposer: String,
    pub reveal_root: [u8; 32],
    pub timestamp: i64,
    pub mts: Vec<MatchingTx>,
    pub proposer_pubkey: SphincsPublicKey,
    pub signature: SphincsSignature,
}

impl B2Block {
    /// Build and sign a phase-2 block over the given reveals.
    pub fn new(
        round: u64,
        height: u64,
        b1_hash: [u8; 32],
        mts: Vec<MatchingTx>,
        keypair: &SphincsKeypair,
    ) -> CoreResult<Self> {
        let proposer = keypair.address();
        let timestamp = Utc::now().timestamp();
        let reveal_root = reveal_root_of(&mts)?;

        let header = header_bytes(round, height, &b1_hash, &proposer, &reveal_root, timestamp)?;
        let signature = keypair.sign(&tagged_header(BlockPhase::B2, &header))?;

        Ok(Self {
            round,
            height,
            b1_hash,
            proposer,
            reveal_root,
            timestamp,
            mts,
            proposer_pubkey: keypair.public.clone(),
            signature,
        })
    }

    pub fn hash(&self) -> CoreResult<[u8; 32]> {
        let header = self.header_bytes()?;
        Ok(HashFunctions::sha3_256(&tagged_header(BlockPhase::B2, &header)))
    }

    pub fn header_bytes(&self) -> CoreResult<Vec<u8>> {
        header_bytes(
            self.round,
            self.height,
            &self.b1_hash,
            &self.proposer,
            &self.reveal_root,
            self.timestamp,
        )
    }

    pub fn verify_signature(&self) -> bool {
        if derive_address(&self.proposer_pubkey) != self.proposer {
            return false;
        }

        let header = match self.header_bytes() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        verify_header_signature(BlockPhase::B2, &header, &self.signature, &self.proposer_pubkey)
    }

    /// Recompute the Merkle root over the reveal hashes.
    pub fn compute_reveal_root(&self) -> CoreResult<[u8; 32]> {
        reveal_root_of(&self.mts)
    }

    pub fn payload_len(&self) -> CoreResult<usize> {
        let len = bincode::serialized_size(&self.mts)?;
        Ok(len as usize)
    }
}

/// Both phases share one header layout: the linking hash is the parent for
/// phase 1 and the referenced phase-1 block for phase 2.
fn header_bytes(
    round: u64,
    height: u64,
    link: &[u8; 32],
    proposer: &str,
    payload_root_hash: &[u8; 32],
    timestamp: i64,
) -> CoreResult<Vec<u8>> {
    let bytes = bincode::serialize(&(round, height, link, proposer, payload_root_hash, timestamp))?;
    Ok(bytes)
}

/// Decoded view of the shared header layout, for inspecting signed header
/// bytes received off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub round: u64,
    pub height: u64,
    pub link: [u8; 32],
    pub proposer: String,
    pub payload_root: [u8; 32],
    pub timestamp: i64,
}

impl BlockHeader {
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        let header = bincode::deserialize(bytes)?;
        Ok(header)
    }
}

fn tagged_header(phase: BlockPhase, header: &[u8]) -> Vec<u8> {
    let domain = phase.domain();
    let mut data = Vec::with_capacity(domain.len() + header.len());
    data.extend_from_slice(domain);
    data.extend_from_slice(header);
    data
}

/// Verify a detached proposer signature over a phase-tagged header.
pub fn verify_header_signature(
    phase: BlockPhase,
    header: &[u8],
    signature: &SphincsSignature,
    pubkey: &SphincsPublicKey,
) -> bool {
    SphincsSignatureScheme::verify(&tagged_header(phase, header), signature, pubkey).is_ok()
}

fn commitment_root_of(phts: &[PartiallyHiddenTx]) -> [u8; 32] {
    let leaves: Vec<[u8; 32]> = phts.iter().map(|pht| *pht.commitment.as_bytes()).collect();
    payload_root(&leaves)
}

fn reveal_root_of(mts: &[MatchingTx]) -> CoreResult<[u8; 32]> {
    let leaves = mts.iter().map(|mt| mt.hash()).collect::<CoreResult<Vec<[u8; 32]>>>()?;
    Ok(payload_root(&leaves))
}
