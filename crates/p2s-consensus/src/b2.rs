// PHASE 2: block assembly and validation.
//
// SAFETY INVARIANTS:
// 1. Every reveal must open a commitment carried by the exact finalized
//    phase-1 block the header references; no other block can satisfy it.
// 2. One commitment is matched at most once per phase-2 block.
// 3. Matched indices increase strictly, so revealed execution order is the
//    committed order and nothing can be reordered at reveal time.
// 4. The reveal window is judged by the block's own round, never by local
//    clocks.

use crate::config::ProtocolConfig;
use crate::errors::{ConsensusError, ConsensusResult};
use crate::round::{check_activation, RevealWindow};
use p2s_core::{check_against_b1, reveal, B1Block, B2Block, MatchError, SecretStore};
use p2s_crypto::{Commitment, SphincsKeypair};
use std::collections::HashSet;

/// Everything validation needs besides the block and its phase-1 block.
pub struct B2Context<'a> {
    /// Proposer selection output for the block's round
    pub expected_proposer: &'a str,
    pub config: &'a ProtocolConfig,
}

/// Build and sign a phase-2 block revealing the stored secrets for `b1`.
///
/// Reveals are emitted in the phase-1 payload order. A stored secret that no
/// longer opens its commitment is logged and skipped rather than poisoning
/// the rest of the block.
pub fn assemble_b2(
    config: &ProtocolConfig,
    b1: &B1Block,
    store: &SecretStore,
    round: u64,
    height: u64,
    keypair: &SphincsKeypair,
) -> ConsensusResult<B2Block> {
    check_activation(height, config.activation_height)?;

    let mut mts = Vec::new();
    for (position, pht) in b1.phts.iter().enumerate() {
        let secret = match store.secret_for(&pht.commitment) {
            Some(secret) => secret,
            None => continue,
        };
        match reveal(pht, secret) {
            Ok(mt) => mts.push(mt),
            Err(e) => {
                let err = ConsensusError::CommitmentMismatch {
                    commitment: pht.commitment.to_hex(),
                    position,
                };
                log::error!("Skipping corrupt stored secret: {} ({})", err, e);
            }
        }
    }

    if mts.is_empty() {
        return Err(ConsensusError::EmptyBlock);
    }
    if mts.len() > config.max_mts_per_block {
        return Err(ConsensusError::TooManyMts {
            count: mts.len(),
            limit: config.max_mts_per_block,
        });
    }

    let block = B2Block::new(round, height, b1.hash()?, mts, keypair)?;

    let bytes = block.payload_len()?;
    if bytes > config.max_payload_bytes {
        return Err(ConsensusError::PayloadTooLarge {
            bytes,
            limit: config.max_payload_bytes,
        });
    }

    log::info!(
        "Assembled B2 at round {} height {}: {} of {} commitments revealed",
        round,
        height,
        block.mts.len(),
        b1.phts.len()
    );
    Ok(block)
}

/// Full admission pipeline for a proposed phase-2 block.
///
/// `b1` must be the finalized phase-1 block the coordinator resolved for
/// `block.b1_hash`, and `b1_final_round` the round it finalized in. A valid
/// block may reveal any non-empty subset of the phase-1 commitments.
pub fn validate_b2(
    block: &B2Block,
    b1: &B1Block,
    b1_final_round: u64,
    ctx: &B2Context<'_>,
) -> ConsensusResult<()> {
    check_activation(block.height, ctx.config.activation_height)?;

    let b1_hash = b1.hash()?;
    if block.b1_hash != b1_hash {
        return Err(ConsensusError::UnknownBlock {
            hash: hex::encode(block.b1_hash),
        });
    }

    let window = RevealWindow::new(b1_final_round, ctx.config.reveal_window_rounds);
    if !window.accepts(block.round) {
        return Err(ConsensusError::WindowExpired {
            b1_hash: hex::encode(b1_hash),
            close_round: window.close_round(),
            round: block.round,
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

    if block.mts.is_empty() {
        return Err(ConsensusError::EmptyBlock);
    }
    if block.mts.len() > ctx.config.max_mts_per_block {
        return Err(ConsensusError::TooManyMts {
            count: block.mts.len(),
            limit: ctx.config.max_mts_per_block,
        });
    }

    let bytes = block.payload_len()?;
    if bytes > ctx.config.max_payload_bytes {
        return Err(ConsensusError::PayloadTooLarge {
            bytes,
            limit: ctx.config.max_payload_bytes,
        });
    }

    let mut matched: HashSet<Commitment> = HashSet::with_capacity(block.mts.len());
    let mut prev_index: Option<usize> = None;
    for (position, mt) in block.mts.iter().enumerate() {
        if !mt.verify_signature() {
            return Err(ConsensusError::BadSignature {
                who: mt.transaction.sender.clone(),
            });
        }

        let index = check_against_b1(mt, b1, &matched).map_err(map_match_error)?;

        if let Some(prev) = prev_index {
            if index <= prev {
                return Err(ConsensusError::OrderingViolation {
                    position,
                    prev_index: prev,
                    index,
                });
            }
        }
        prev_index = Some(index);
        matched.insert(b1.phts[index].commitment);
    }

    let computed = block.compute_reveal_root()?;
    if computed != block.reveal_root {
        return Err(ConsensusError::RootMismatch {
            expected: hex::encode(block.reveal_root),
            got: hex::encode(computed),
        });
    }

    log::debug!(
        "B2 at round {} passed validation ({} of {} commitments revealed)",
        block.round,
        block.mts.len(),
        b1.phts.len()
    );
    Ok(())
}

fn map_match_error(err: MatchError) -> ConsensusError {
    match err {
        MatchError::UnknownCommitment { commitment } => {
            ConsensusError::UnknownCommitment { commitment }
        }
        MatchError::AlreadyMatched { commitment } => ConsensusError::AlreadyMatched { commitment },
        MatchError::EnvelopeMismatch { commitment } => {
            ConsensusError::EnvelopeMismatch { commitment }
        }
        MatchError::Core(e) => ConsensusError::Other(e.to_string()),
    }
}
