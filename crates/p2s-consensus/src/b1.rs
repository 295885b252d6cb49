// PHASE 1: block assembly and validation.
//
// SAFETY INVARIANTS:
// 1. A phase-1 block never carries recipient, value, or call data; its
//    payload is opaque envelopes only.
// 2. The header signature is checked before any payload rule, so every
//    payload violation is attributable to the proposer who signed.
// 3. Commitments inside one block are unique; a committee replaying an
//    envelope twice is a proposer fault, not an originator fault.

use crate::config::ProtocolConfig;
use crate::errors::{ConsensusError, ConsensusResult};
use crate::round::check_activation;
use p2s_core::{B1Block, PartiallyHiddenTx};
use p2s_crypto::SphincsKeypair;
use std::collections::HashSet;

/// Everything validation needs besides the block itself.
pub struct B1Context<'a> {
    /// Hash the new block must extend
    pub parent_hash: [u8; 32],
    /// Proposer selection output for the block's round
    pub expected_proposer: &'a str,
    pub config: &'a ProtocolConfig,
}

/// Build and sign a phase-1 block over the drained envelopes.
pub fn assemble_b1(
    config: &ProtocolConfig,
    phts: Vec<PartiallyHiddenTx>,
    parent_hash: [u8; 32],
    round: u64,
    height: u64,
    keypair: &SphincsKeypair,
) -> ConsensusResult<B1Block> {
    check_activation(height, config.activation_height)?;

    if phts.len() > config.max_phts_per_block {
        return Err(ConsensusError::TooManyPhts {
            count: phts.len(),
            limit: config.max_phts_per_block,
        });
    }

    let block = B1Block::new(round, height, parent_hash, phts, keypair)?;

    let bytes = block.payload_len()?;
    if bytes > config.max_payload_bytes {
        return Err(ConsensusError::PayloadTooLarge {
            bytes,
            limit: config.max_payload_bytes,
        });
    }

    log::info!(
        "Assembled B1 at round {} height {}: {} envelopes, {} bytes",
        round,
        height,
        block.phts.len(),
        bytes
    );
    Ok(block)
}

/// Full admission pipeline for a proposed phase-1 block.
///
/// Checks run cheapest-first and identity-before-payload: chain position,
/// then the proposer and their signature, then every payload rule. The
/// first failure wins.
pub fn validate_b1(block: &B1Block, ctx: &B1Context<'_>) -> ConsensusResult<()> {
    check_activation(block.height, ctx.config.activation_height)?;

    if block.parent_hash != ctx.parent_hash {
        return Err(ConsensusError::ParentMismatch {
            expected: hex::encode(ctx.parent_hash),
            got: hex::encode(block.parent_hash),
        });
    }

    if block.proposer != ctx.expected_proposer {
        return Err(ConsensusError::ProposerMismatch {
            expected: ctx.expected_proposer.to_string(),
            got: block.proposer.clone(),
            round: block.round,
        });
    }

    if !block.verify_signature() {
        return Err(ConsensusError::BadSignature {
            who: block.proposer.clone(),
        });
    }

    if block.phts.len() > ctx.config.max_phts_per_block {
        return Err(ConsensusError::TooManyPhts {
            count: block.phts.len(),
            limit: ctx.config.max_phts_per_block,
        });
    }

    let bytes = block.payload_len()?;
    if bytes > ctx.config.max_payload_bytes {
        return Err(ConsensusError::PayloadTooLarge {
            bytes,
            limit: ctx.config.max_payload_bytes,
        });
    }

    let mut seen: HashSet<[u8; 32]> = HashSet::with_capacity(block.phts.len());
    for pht in &block.phts {
        if !pht.verify_envelope() {
            return Err(ConsensusError::BadSignature {
                who: pht.sender.clone(),
            });
        }
        if !seen.insert(*pht.commitment.as_bytes()) {
            return Err(ConsensusError::DuplicateCommitment {
                commitment: pht.commitment.to_hex(),
            });
        }
    }

    let computed = block.compute_commitment_root();
    if computed != block.commitment_root {
        return Err(ConsensusError::RootMismatch {
            expected: hex::encode(block.commitment_root),
            got: hex::encode(computed),
        });
    }

    log::debug!(
        "B1 {} at round {} passed validation ({} envelopes)",
        block.hash().map(hex::encode).unwrap_or_default(),
        block.round,
        block.phts.len()
    );
    Ok(())
}
