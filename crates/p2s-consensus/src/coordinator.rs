// Pairing and finality coordination across rounds.
//
// SAFETY INVARIANTS:
// 1. A pairing exists only for a finalized phase-1 block; validation of any
//    phase-2 block resolves its phase-1 block through the pairing map.
// 2. Registry outcomes are applied with the pairing map released, and always
//    after it; no path acquires the pairing lock while holding the registry.
// 3. Guards are never held across an await point.
// 4. Expiry, reveal, and rejection paths drive every status change through
//    the core transition functions; no status is assigned directly.

use crate::b1::{assemble_b1, validate_b1, B1Context};
use crate::b2::{assemble_b2, validate_b2, B2Context};
use crate::config::ProtocolConfig;
use crate::errors::{ConsensusError, ConsensusResult};
use crate::registry::{Outcome, OutcomeEvent, ValidatorRegistry};
use crate::round::RevealWindow;
use crate::selection::select_proposer;
use p2s_core::{
    check_against_b1, verify_header_signature, B1Block, B1Status, B2Block, B2Status, BlockHeader,
    BlockPhase, PartiallyHiddenTx, PendingPool, PhtStatus, RevealSecret, SecretStore,
};
use p2s_crypto::{derive_address, Commitment, SphincsKeypair, SphincsPublicKey, SphincsSignature};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One finalized phase-1 block waiting for (or closed by) its phase-2 block.
#[derive(Debug, Clone)]
pub struct Pairing {
    pub b1: B1Block,
    /// Round the phase-1 block finalized in (its own round)
    pub final_round: u64,
    pub window: RevealWindow,
    pub b1_status: B1Status,
    pub b2_status: B2Status,
    /// Parallel to `b1.phts`
    pub pht_status: Vec<PhtStatus>,
}

/// Read-only snapshot of a pairing for hosts and tests.
#[derive(Debug, Clone)]
pub struct PairingView {
    pub final_round: u64,
    pub close_round: u64,
    pub b2_status: B2Status,
    pub pht_status: Vec<PhtStatus>,
}

/// Two conflicting signed headers of one phase, attributed to one validator
/// for one round.
#[derive(Debug, Clone)]
pub struct EquivocationEvidence {
    pub round: u64,
    pub phase: BlockPhase,
    pub address: String,
    pub pubkey: SphincsPublicKey,
    pub header_a: Vec<u8>,
    pub signature_a: SphincsSignature,
    pub header_b: Vec<u8>,
    pub signature_b: SphincsSignature,
}

/// The validity predicates the host import pipeline plugs in.
pub trait PhaseValidity {
    fn validate_b1(&self, block: &B1Block) -> ConsensusResult<()>;
    fn validate_b2(&self, block: &B2Block) -> ConsensusResult<()>;
}

struct ChainCursor {
    tip_hash: [u8; 32],
    tip_height: u64,
    round: u64,
}

/// Drives the phase-1/phase-2 lifecycle: opens a reveal window per finalized
/// phase-1 block, matches finalized phase-2 blocks against it, expires
/// windows on round advance, and feeds every outcome into the validator
/// registry.
///
/// The host chain owns finality; this type owns what finality means for the
/// pairing state.
pub struct PairingCoordinator {
    config: ProtocolConfig,
    registry: RwLock<ValidatorRegistry>,
    pool: Arc<PendingPool>,
    store: Mutex<SecretStore>,
    pairings: RwLock<HashMap<[u8; 32], Pairing>>,
    seeds: RwLock<HashMap<u64, Vec<u8>>>,
    cursor: RwLock<ChainCursor>,
}

impl PairingCoordinator {
    pub fn new(
        config: ProtocolConfig,
        registry: ValidatorRegistry,
        pool: Arc<PendingPool>,
        genesis_hash: [u8; 32],
        genesis_height: u64,
    ) -> ConsensusResult<Self> {
        config.validate()?;
        log::info!(
            "Pairing coordinator starting at height {} with {} validators",
            genesis_height,
            registry.len()
        );
        Ok(Self {
            config,
            registry: RwLock::new(registry),
            pool,
            store: Mutex::new(SecretStore::new()),
            pairings: RwLock::new(HashMap::new()),
            seeds: RwLock::new(HashMap::new()),
            cursor: RwLock::new(ChainCursor {
                tip_hash: genesis_hash,
                tip_height: genesis_height,
                round: 0,
            }),
        })
    }

    // ==================== ROUND LIFECYCLE ====================

    /// Record the selection seed for `round`, then expire every pairing whose
    /// reveal window closed without a finalized phase-2 block.
    ///
    /// Expiry marks the slot `TimedOut`, marks every unresolved hidden
    /// transaction `MissedReveal`, purges their secrets, and reports one
    /// `MissedReveal` outcome per implicated originator. All of it is
    /// idempotent; a second advance past the same window reports nothing.
    /// Settled pairings (finalized or timed out) are dropped once their
    /// window falls behind the same horizon that bounds seed retention.
    pub fn on_round_advanced(&self, round: u64, seed: &[u8]) -> Vec<OutcomeEvent> {
        {
            let mut seeds = self.seeds.write();
            seeds.insert(round, seed.to_vec());
            let keep_from = round.saturating_sub(self.config.reveal_window_rounds.saturating_add(2));
            seeds.retain(|r, _| *r >= keep_from);
        }
        {
            let mut cursor = self.cursor.write();
            if round > cursor.round {
                cursor.round = round;
            }
        }

        let mut implicated: Vec<(String, Outcome)> = Vec::new();
        let mut dead_secrets: Vec<Commitment> = Vec::new();
        {
            let mut pairings = self.pairings.write();
            for (hash, pairing) in pairings.iter_mut() {
                if matches!(pairing.b2_status, B2Status::Finalized | B2Status::TimedOut) {
                    continue;
                }
                if !pairing.window.has_closed(round) {
                    continue;
                }

                match pairing.b2_status.advance(B2Status::TimedOut) {
                    Ok(next) => pairing.b2_status = next,
                    Err(e) => {
                        log::error!("Cannot time out pairing {}: {}", hex::encode(hash), e);
                        continue;
                    }
                }

                let mut senders: HashSet<String> = HashSet::new();
                for (index, status) in pairing.pht_status.iter_mut().enumerate() {
                    if status.is_terminal() {
                        continue;
                    }
                    match status.advance(PhtStatus::MissedReveal) {
                        Ok(next) => {
                            *status = next;
                            senders.insert(pairing.b1.phts[index].sender.clone());
                            dead_secrets.push(pairing.b1.phts[index].commitment);
                        }
                        Err(e) => log::error!(
                            "Cannot mark envelope {} of {} missed: {}",
                            index,
                            hex::encode(hash),
                            e
                        ),
                    }
                }

                log::warn!(
                    "Reveal window for B1 {} closed at round {}: {} originators missed",
                    hex::encode(hash),
                    round,
                    senders.len()
                );
                implicated.extend(senders.into_iter().map(|s| (s, Outcome::MissedReveal)));
            }

            let keep_from = round.saturating_sub(self.config.reveal_window_rounds.saturating_add(2));
            pairings.retain(|hash, pairing| {
                let settled = matches!(pairing.b2_status, B2Status::Finalized | B2Status::TimedOut);
                if settled && pairing.window.close_round() < keep_from {
                    log::debug!("Dropping settled pairing {}", hex::encode(hash));
                    return false;
                }
                true
            });
        }

        if !dead_secrets.is_empty() {
            let mut store = self.store.lock();
            for commitment in &dead_secrets {
                store.purge(commitment);
            }
        }

        if implicated.is_empty() {
            return Vec::new();
        }
        let mut registry = self.registry.write();
        registry.apply_outcome_batch(round, &implicated)
    }

    // ==================== FINALITY CALLBACKS ====================

    /// Host callback: a phase-1 block finalized.
    ///
    /// Opens the reveal window, becomes the chain tip, and credits the
    /// proposer. Re-delivery of an already-known block is a no-op.
    pub fn on_finalized_b1(&self, block: &B1Block) -> ConsensusResult<Option<OutcomeEvent>> {
        let hash = block.hash()?;

        {
            let mut pairings = self.pairings.write();
            if pairings.contains_key(&hash) {
                log::debug!("B1 {} already finalized, ignoring", hex::encode(hash));
                return Ok(None);
            }

            let b1_status = B1Status::Proposed.advance(B1Status::Finalized)?;
            let pht_status = block
                .phts
                .iter()
                .map(|_| PhtStatus::Pending.advance(PhtStatus::InB1))
                .collect::<Result<Vec<_>, _>>()?;

            pairings.insert(
                hash,
                Pairing {
                    b1: block.clone(),
                    final_round: block.round,
                    window: RevealWindow::new(block.round, self.config.reveal_window_rounds),
                    b1_status,
                    b2_status: B2Status::AwaitingReveal,
                    pht_status,
                },
            );
        }

        {
            let mut cursor = self.cursor.write();
            cursor.tip_hash = hash;
            cursor.tip_height = block.height;
        }

        log::info!(
            "B1 {} finalized at round {} with {} envelopes, window closes after round {}",
            hex::encode(hash),
            block.round,
            block.phts.len(),
            block.round + self.config.reveal_window_rounds
        );

        let mut registry = self.registry.write();
        if !registry.contains(&block.proposer) {
            log::warn!(
                "Finalized B1 proposer {} is not in the registry, no credit applied",
                block.proposer
            );
            return Ok(None);
        }
        registry.apply_outcome(block.round, &block.proposer, Outcome::ProposedValidB1)
    }

    /// Host callback: a phase-2 block finalized.
    ///
    /// Closes the pairing: matched hidden transactions become
    /// `RevealedViaB2`, anything the block left unmatched becomes
    /// `MissedReveal` against its originator, every secret of the pairing is
    /// purged, and the proposer is credited.
    pub fn on_finalized_b2(&self, block: &B2Block) -> ConsensusResult<Vec<OutcomeEvent>> {
        let b2_hash = block.hash()?;
        let mut outcomes: Vec<(String, Outcome)> = Vec::new();
        let mut purgeable: Vec<Commitment> = Vec::new();

        {
            let mut pairings = self.pairings.write();
            let pairing = pairings
                .get_mut(&block.b1_hash)
                .ok_or(ConsensusError::UnknownBlock {
                    hash: hex::encode(block.b1_hash),
                })?;

            if pairing.b2_status == B2Status::Finalized {
                log::debug!(
                    "Pairing for B1 {} already closed, ignoring",
                    hex::encode(block.b1_hash)
                );
                return Ok(Vec::new());
            }

            let mut status = pairing.b2_status;
            loop {
                status = match status {
                    B2Status::Finalized => break,
                    B2Status::AwaitingReveal => status.advance(B2Status::Proposed)?,
                    B2Status::Proposed => status.advance(B2Status::Finalized)?,
                    B2Status::Rejected => status.advance(B2Status::AwaitingReveal)?,
                    B2Status::TimedOut => {
                        return Err(ConsensusError::WindowExpired {
                            b1_hash: hex::encode(block.b1_hash),
                            close_round: pairing.window.close_round(),
                            round: block.round,
                        })
                    }
                };
            }
            pairing.b2_status = status;

            // Pair each reveal to its envelope. The block passed validation
            // before finality; a mismatch here means the host finalized
            // something this node would have rejected, so salvage what pairs
            // and log the rest.
            let mut matched: HashSet<Commitment> = HashSet::with_capacity(block.mts.len());
            for mt in &block.mts {
                match check_against_b1(mt, &pairing.b1, &matched) {
                    Ok(index) => {
                        matched.insert(pairing.b1.phts[index].commitment);
                        match pairing.pht_status[index].advance(PhtStatus::RevealedViaB2) {
                            Ok(next) => pairing.pht_status[index] = next,
                            Err(e) => log::error!(
                                "Cannot mark envelope {} of {} revealed: {}",
                                index,
                                hex::encode(block.b1_hash),
                                e
                            ),
                        }
                    }
                    Err(e) => log::error!(
                        "Finalized B2 {} carries an unpairable reveal: {}",
                        hex::encode(b2_hash),
                        e
                    ),
                }
            }

            // Whatever the block left unmatched is missed for good.
            let mut missed_senders: HashSet<String> = HashSet::new();
            for (index, status) in pairing.pht_status.iter_mut().enumerate() {
                if status.is_terminal() {
                    continue;
                }
                match status.advance(PhtStatus::MissedReveal) {
                    Ok(next) => {
                        *status = next;
                        missed_senders.insert(pairing.b1.phts[index].sender.clone());
                    }
                    Err(e) => log::error!(
                        "Cannot mark envelope {} of {} missed: {}",
                        index,
                        hex::encode(block.b1_hash),
                        e
                    ),
                }
            }

            purgeable.extend(pairing.b1.phts.iter().map(|pht| pht.commitment));
            outcomes.extend(
                missed_senders
                    .into_iter()
                    .map(|s| (s, Outcome::MissedReveal)),
            );

            log::info!(
                "B2 {} finalized at round {}: {} of {} envelopes revealed",
                hex::encode(b2_hash),
                block.round,
                matched.len(),
                pairing.b1.phts.len()
            );
        }

        {
            let mut cursor = self.cursor.write();
            cursor.tip_hash = b2_hash;
            cursor.tip_height = block.height;
        }

        {
            let mut store = self.store.lock();
            for commitment in &purgeable {
                store.purge(commitment);
            }
        }

        outcomes.push((block.proposer.clone(), Outcome::ProposedValidB2));
        let mut registry = self.registry.write();
        Ok(registry.apply_outcome_batch(block.round, &outcomes))
    }

    // ==================== REJECTION CALLBACKS ====================

    /// Host callback: a phase-1 block was rejected.
    ///
    /// Its envelopes re-enter the pending pool. When the rejection reason
    /// proves the signed payload itself was malformed, the proposer is
    /// reported for an invalid block.
    pub async fn on_rejected_b1(
        &self,
        block: &B1Block,
        reason: &ConsensusError,
    ) -> Vec<OutcomeEvent> {
        log::warn!(
            "B1 by {} at round {} rejected: {}",
            block.proposer,
            block.round,
            reason
        );

        self.pool.return_to_pool(block.phts.clone()).await;

        if !b1_rejection_is_misbehavior(reason) {
            return Vec::new();
        }
        self.penalize_proposer(&block.proposer, block.round)
    }

    /// Host callback: a phase-2 block was rejected.
    ///
    /// The pairing reopens; a corrected phase-2 block may still arrive
    /// before the window closes. Provable misbehavior is reported.
    pub fn on_rejected_b2(&self, block: &B2Block, reason: &ConsensusError) -> Vec<OutcomeEvent> {
        log::warn!(
            "B2 by {} at round {} rejected: {}",
            block.proposer,
            block.round,
            reason
        );

        {
            let mut pairings = self.pairings.write();
            if let Some(pairing) = pairings.get_mut(&block.b1_hash) {
                let reopened = match pairing.b2_status {
                    B2Status::AwaitingReveal => pairing.b2_status.advance(B2Status::Proposed),
                    other => Ok(other),
                }
                .and_then(|s| s.advance(B2Status::Rejected))
                .and_then(|s| s.advance(B2Status::AwaitingReveal));
                match reopened {
                    Ok(status) => pairing.b2_status = status,
                    Err(_) => log::debug!(
                        "Pairing for B1 {} is {:?}, rejection does not reopen it",
                        hex::encode(block.b1_hash),
                        pairing.b2_status
                    ),
                }
            }
        }

        if !b2_rejection_is_misbehavior(reason) {
            return Vec::new();
        }
        self.penalize_proposer(&block.proposer, block.round)
    }

    /// Verify and apply equivocation evidence: two distinct headers of the
    /// same phase, signed by the same validator for the same round.
    ///
    /// Both headers must decode, carry the claimed round and name the accused
    /// validator as proposer; the signatures are checked under the claimed
    /// phase's signing domain.
    ///
    /// Returns `Ok(None)` when the evidence was already processed.
    pub fn report_equivocation(
        &self,
        evidence: &EquivocationEvidence,
    ) -> ConsensusResult<Option<OutcomeEvent>> {
        if evidence.header_a == evidence.header_b {
            return Err(ConsensusError::InvalidEvidence {
                reason: "the two headers are identical".to_string(),
            });
        }
        if derive_address(&evidence.pubkey) != evidence.address {
            return Err(ConsensusError::InvalidEvidence {
                reason: "public key does not derive the accused address".to_string(),
            });
        }
        for bytes in [&evidence.header_a, &evidence.header_b] {
            let header =
                BlockHeader::decode(bytes).map_err(|e| ConsensusError::InvalidEvidence {
                    reason: format!("undecodable header: {}", e),
                })?;
            if header.round != evidence.round {
                return Err(ConsensusError::InvalidEvidence {
                    reason: format!(
                        "header is for round {}, evidence claims round {}",
                        header.round, evidence.round
                    ),
                });
            }
            if header.proposer != evidence.address {
                return Err(ConsensusError::InvalidEvidence {
                    reason: format!(
                        "header names proposer {}, evidence accuses {}",
                        header.proposer, evidence.address
                    ),
                });
            }
        }
        let a_ok = verify_header_signature(
            evidence.phase,
            &evidence.header_a,
            &evidence.signature_a,
            &evidence.pubkey,
        );
        let b_ok = verify_header_signature(
            evidence.phase,
            &evidence.header_b,
            &evidence.signature_b,
            &evidence.pubkey,
        );
        if !a_ok || !b_ok {
            return Err(ConsensusError::BadSignature {
                who: evidence.address.clone(),
            });
        }

        log::warn!(
            "Equivocation proven against {} at round {}",
            evidence.address,
            evidence.round
        );
        let mut registry = self.registry.write();
        registry.apply_outcome(evidence.round, &evidence.address, Outcome::ProposedInvalidBlock)
    }

    // ==================== PROPOSAL HELPERS ====================

    /// Drain the pending pool and build this round's phase-1 block on the
    /// current tip.
    pub async fn assemble_b1_at(
        &self,
        round: u64,
        height: u64,
        keypair: &SphincsKeypair,
    ) -> ConsensusResult<B1Block> {
        let parent_hash = self.cursor.read().tip_hash;
        let phts = self
            .pool
            .drain_for_block(self.config.max_phts_per_block, self.config.max_payload_bytes)
            .await;

        match assemble_b1(&self.config, phts.clone(), parent_hash, round, height, keypair) {
            Ok(block) => Ok(block),
            Err(e) => {
                self.pool.return_to_pool(phts).await;
                Err(e)
            }
        }
    }

    /// Build the phase-2 block for one finalized phase-1 block from the
    /// secrets held locally.
    pub fn assemble_b2_for(
        &self,
        b1_hash: &[u8; 32],
        round: u64,
        height: u64,
        keypair: &SphincsKeypair,
    ) -> ConsensusResult<B2Block> {
        let pairings = self.pairings.read();
        let pairing = pairings.get(b1_hash).ok_or(ConsensusError::UnknownBlock {
            hash: hex::encode(b1_hash),
        })?;

        let store = self.store.lock();
        assemble_b2(&self.config, &pairing.b1, &store, round, height, keypair)
    }

    /// Pairings still open to a phase-2 block at `round`.
    pub fn due_reveals(&self, round: u64) -> Vec<[u8; 32]> {
        self.pairings
            .read()
            .iter()
            .filter(|(_, pairing)| {
                matches!(
                    pairing.b2_status,
                    B2Status::AwaitingReveal | B2Status::Rejected
                ) && pairing.window.accepts(round)
            })
            .map(|(hash, _)| *hash)
            .collect()
    }

    // ==================== ORIGINATOR SURFACE ====================

    /// Admit a hidden transaction into the pending pool.
    pub async fn submit_pht(&self, pht: PartiallyHiddenTx) -> bool {
        self.pool.submit(pht).await
    }

    /// Retain a reveal secret until its commitment is revealed or expires.
    pub fn store_secret(&self, secret: RevealSecret) -> ConsensusResult<Commitment> {
        let mut store = self.store.lock();
        Ok(store.put(secret)?)
    }

    // ==================== READ SURFACE ====================

    /// Selection result for `round` under its recorded seed.
    pub fn expected_proposer(&self, round: u64) -> ConsensusResult<String> {
        let seed = self.seed_for(round)?;
        let registry = self.registry.read();
        select_proposer(&registry.active_snapshot(), round, &seed)
    }

    pub fn pairing_view(&self, b1_hash: &[u8; 32]) -> Option<PairingView> {
        self.pairings.read().get(b1_hash).map(|pairing| PairingView {
            final_round: pairing.final_round,
            close_round: pairing.window.close_round(),
            b2_status: pairing.b2_status,
            pht_status: pairing.pht_status.clone(),
        })
    }

    pub fn registry(&self) -> RwLockReadGuard<'_, ValidatorRegistry> {
        self.registry.read()
    }

    pub fn current_round(&self) -> u64 {
        self.cursor.read().round
    }

    pub fn tip(&self) -> ([u8; 32], u64) {
        let cursor = self.cursor.read();
        (cursor.tip_hash, cursor.tip_height)
    }

    pub fn secrets_held(&self) -> usize {
        self.store.lock().len()
    }

    fn seed_for(&self, round: u64) -> ConsensusResult<Vec<u8>> {
        self.seeds
            .read()
            .get(&round)
            .cloned()
            .ok_or(ConsensusError::SeedUnavailable { round })
    }

    fn penalize_proposer(&self, proposer: &str, round: u64) -> Vec<OutcomeEvent> {
        let mut registry = self.registry.write();
        if !registry.contains(proposer) {
            log::warn!("Misbehaving proposer {} is not in the registry", proposer);
            return Vec::new();
        }
        match registry.apply_outcome(round, proposer, Outcome::ProposedInvalidBlock) {
            Ok(Some(event)) => vec![event],
            Ok(None) => Vec::new(),
            Err(e) => {
                log::error!("Failed to penalize {}: {}", proposer, e);
                Vec::new()
            }
        }
    }
}

impl PhaseValidity for PairingCoordinator {
    fn validate_b1(&self, block: &B1Block) -> ConsensusResult<()> {
        let expected = self.expected_proposer(block.round)?;
        let parent_hash = self.cursor.read().tip_hash;

        let ctx = B1Context {
            parent_hash,
            expected_proposer: &expected,
            config: &self.config,
        };
        validate_b1(block, &ctx)
    }

    fn validate_b2(&self, block: &B2Block) -> ConsensusResult<()> {
        let expected = self.expected_proposer(block.round)?;
        let ctx = B2Context {
            expected_proposer: &expected,
            config: &self.config,
        };

        let pairings = self.pairings.read();
        let pairing = pairings
            .get(&block.b1_hash)
            .ok_or(ConsensusError::B1NotFinalized {
                b1_hash: hex::encode(block.b1_hash),
            })?;
        validate_b2(block, &pairing.b1, pairing.final_round, &ctx)
    }
}

/// Phase-1 rejection reasons that prove the proposer signed a malformed
/// payload. Everything before the signature check stays unattributable.
fn b1_rejection_is_misbehavior(reason: &ConsensusError) -> bool {
    matches!(
        reason,
        ConsensusError::DuplicateCommitment { .. }
            | ConsensusError::RootMismatch { .. }
            | ConsensusError::TooManyPhts { .. }
            | ConsensusError::PayloadTooLarge { .. }
    )
}

/// Phase-2 rejection reasons that prove misbehavior by the proposer.
fn b2_rejection_is_misbehavior(reason: &ConsensusError) -> bool {
    matches!(
        reason,
        ConsensusError::UnknownCommitment { .. }
            | ConsensusError::AlreadyMatched { .. }
            | ConsensusError::EnvelopeMismatch { .. }
            | ConsensusError::OrderingViolation { .. }
            | ConsensusError::CommitmentMismatch { .. }
            | ConsensusError::RootMismatch { .. }
            | ConsensusError::TooManyMts { .. }
            | ConsensusError::PayloadTooLarge { .. }
            | ConsensusError::EmptyBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BootstrapEntry;
    use crate::test_support::{keypair, keypair_for, test_pht};

    const ONE_STAKE: u128 = 1_000_000_000_000_000_000;
    const GENESIS: [u8; 32] = [0u8; 32];

    fn test_coordinator() -> PairingCoordinator {
        let entries: Vec<BootstrapEntry> = (0..3)
            .map(|i| BootstrapEntry {
                address: keypair(i).address(),
                stake: ONE_STAKE * (i as u128 + 1),
                reputation: 0.5,
                active: true,
            })
            .collect();
        let registry = ValidatorRegistry::load(ProtocolConfig::default(), &entries, 0).unwrap();
        let pool = PendingPool::new(64);
        PairingCoordinator::new(ProtocolConfig::default(), registry, pool, GENESIS, 0).unwrap()
    }

    fn finalize_b1(coordinator: &PairingCoordinator, phts: Vec<PartiallyHiddenTx>, round: u64) -> B1Block {
        let (tip, height) = coordinator.tip();
        let block = B1Block::new(round, height + 1, tip, phts, keypair(0)).unwrap();
        coordinator.on_finalized_b1(&block).unwrap();
        block
    }

    #[test]
    fn test_finalized_b1_opens_pairing() {
        let coordinator = test_coordinator();
        let block = finalize_b1(&coordinator, vec![test_pht(1, 0).0], 5);
        let hash = block.hash().unwrap();

        let view = coordinator.pairing_view(&hash).unwrap();
        assert_eq!(view.final_round, 5);
        assert_eq!(view.close_round, 7);
        assert_eq!(view.b2_status, B2Status::AwaitingReveal);
        assert_eq!(view.pht_status, vec![PhtStatus::InB1]);

        assert_eq!(coordinator.tip(), (hash, 1));

        let registry = coordinator.registry();
        assert_eq!(registry.history().len(), 1);
        assert_eq!(registry.history()[0].outcome, Outcome::ProposedValidB1);
        assert_eq!(registry.history()[0].address, keypair(0).address());
    }

    #[test]
    fn test_refinalized_b1_is_ignored() {
        let coordinator = test_coordinator();
        let block = finalize_b1(&coordinator, Vec::new(), 5);

        let second = coordinator.on_finalized_b1(&block).unwrap();
        assert!(second.is_none());
        assert_eq!(coordinator.registry().history().len(), 1);
    }

    #[test]
    fn test_window_expiry_reports_missed_reveals() {
        let coordinator = test_coordinator();
        let (pht_a, secret_a) = test_pht(1, 0);
        let (pht_b, _secret_b) = test_pht(1, 1);
        coordinator.store_secret(secret_a).unwrap();
        assert_eq!(coordinator.secrets_held(), 1);

        let block = finalize_b1(&coordinator, vec![pht_a, pht_b], 5);
        let hash = block.hash().unwrap();

        // Rounds 6 and 7 are inside the window; nothing expires.
        assert!(coordinator.on_round_advanced(6, b"s6").is_empty());
        assert!(coordinator.on_round_advanced(7, b"s7").is_empty());

        let events = coordinator.on_round_advanced(8, b"s8");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, Outcome::MissedReveal);
        assert_eq!(events[0].address, keypair(1).address());

        let view = coordinator.pairing_view(&hash).unwrap();
        assert_eq!(view.b2_status, B2Status::TimedOut);
        assert_eq!(
            view.pht_status,
            vec![PhtStatus::MissedReveal, PhtStatus::MissedReveal]
        );
        assert_eq!(coordinator.secrets_held(), 0);

        // A later advance finds everything terminal already.
        assert!(coordinator.on_round_advanced(9, b"s9").is_empty());
    }

    #[test]
    fn test_settled_pairings_are_dropped_after_retention() {
        let coordinator = test_coordinator();
        let (pht_a, _secret_a) = test_pht(1, 0);
        let (pht_b, secret_b) = test_pht(1, 1);
        coordinator.store_secret(secret_b).unwrap();

        let lapsed = finalize_b1(&coordinator, vec![pht_a], 5);
        let lapsed_hash = lapsed.hash().unwrap();
        let revealed = finalize_b1(&coordinator, vec![pht_b], 6);
        let revealed_hash = revealed.hash().unwrap();

        let b2 = coordinator
            .assemble_b2_for(&revealed_hash, 7, 3, keypair(0))
            .unwrap();
        coordinator.on_finalized_b2(&b2).unwrap();

        // The first window closes at round 8 without a phase-2 block; both
        // records survive while their windows sit inside the horizon.
        for round in 7..=11 {
            coordinator.on_round_advanced(round, b"seed");
        }
        assert!(coordinator.pairing_view(&lapsed_hash).is_some());
        assert!(coordinator.pairing_view(&revealed_hash).is_some());

        // Round 12 puts the first window behind the horizon.
        coordinator.on_round_advanced(12, b"seed");
        assert!(coordinator.pairing_view(&lapsed_hash).is_none());
        assert!(coordinator.pairing_view(&revealed_hash).is_some());

        coordinator.on_round_advanced(13, b"seed");
        assert!(coordinator.pairing_view(&revealed_hash).is_none());
    }

    #[test]
    fn test_finalized_b2_closes_pairing() {
        let coordinator = test_coordinator();
        let (pht, secret) = test_pht(1, 0);
        coordinator.store_secret(secret).unwrap();

        let b1 = finalize_b1(&coordinator, vec![pht], 5);
        let hash = b1.hash().unwrap();

        let b2 = coordinator
            .assemble_b2_for(&hash, 6, 2, keypair(0))
            .unwrap();
        let events = coordinator.on_finalized_b2(&b2).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, Outcome::ProposedValidB2);
        assert_eq!(events[0].round, 6);

        let view = coordinator.pairing_view(&hash).unwrap();
        assert_eq!(view.b2_status, B2Status::Finalized);
        assert_eq!(view.pht_status, vec![PhtStatus::RevealedViaB2]);
        assert_eq!(coordinator.secrets_held(), 0);
        assert_eq!(coordinator.tip(), (b2.hash().unwrap(), 2));
    }

    #[test]
    fn test_partial_b2_reports_unrevealed_envelopes() {
        let coordinator = test_coordinator();
        let (pht_a, secret_a) = test_pht(1, 0);
        let (pht_b, _) = test_pht(2, 1);
        coordinator.store_secret(secret_a).unwrap();

        let b1 = finalize_b1(&coordinator, vec![pht_a, pht_b], 5);
        let hash = b1.hash().unwrap();

        let b2 = coordinator
            .assemble_b2_for(&hash, 6, 2, keypair(0))
            .unwrap();
        assert_eq!(b2.mts.len(), 1);

        let events = coordinator.on_finalized_b2(&b2).unwrap();

        let kinds: Vec<(String, Outcome)> = events
            .iter()
            .map(|e| (e.address.clone(), e.outcome))
            .collect();
        assert!(kinds.contains(&(keypair(2).address(), Outcome::MissedReveal)));
        assert!(kinds.contains(&(keypair(0).address(), Outcome::ProposedValidB2)));

        let view = coordinator.pairing_view(&hash).unwrap();
        assert_eq!(
            view.pht_status,
            vec![PhtStatus::RevealedViaB2, PhtStatus::MissedReveal]
        );
    }

    #[test]
    fn test_b2_after_timeout_is_refused() {
        let coordinator = test_coordinator();
        let (pht, secret) = test_pht(1, 0);
        coordinator.store_secret(secret).unwrap();
        let b1 = finalize_b1(&coordinator, vec![pht], 5);
        let hash = b1.hash().unwrap();

        let b2 = coordinator
            .assemble_b2_for(&hash, 6, 2, keypair(0))
            .unwrap();
        coordinator.on_round_advanced(8, b"s8");

        let result = coordinator.on_finalized_b2(&b2);
        assert!(matches!(result, Err(ConsensusError::WindowExpired { .. })));
    }

    #[test]
    fn test_rejected_b2_reopens_window() {
        let coordinator = test_coordinator();
        let (pht, secret) = test_pht(1, 0);
        coordinator.store_secret(secret).unwrap();
        let b1 = finalize_b1(&coordinator, vec![pht], 5);
        let hash = b1.hash().unwrap();

        let b2 = coordinator
            .assemble_b2_for(&hash, 6, 2, keypair(0))
            .unwrap();
        let reason = ConsensusError::UnknownCommitment {
            commitment: "aa".repeat(32),
        };
        let events = coordinator.on_rejected_b2(&b2, &reason);

        // Proposer penalized, window still open for a corrected block.
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, Outcome::ProposedInvalidBlock);
        assert_eq!(
            coordinator.pairing_view(&hash).unwrap().b2_status,
            B2Status::AwaitingReveal
        );
        assert_eq!(coordinator.due_reveals(6), vec![hash]);
    }

    #[test]
    fn test_benign_b2_rejection_carries_no_penalty() {
        let coordinator = test_coordinator();
        let (pht, secret) = test_pht(1, 0);
        coordinator.store_secret(secret).unwrap();
        let b1 = finalize_b1(&coordinator, vec![pht], 5);
        let b2 = coordinator
            .assemble_b2_for(&b1.hash().unwrap(), 6, 2, keypair(0))
            .unwrap();

        let reason = ConsensusError::WindowExpired {
            b1_hash: hex::encode(b1.hash().unwrap()),
            close_round: 7,
            round: 9,
        };
        assert!(coordinator.on_rejected_b2(&b2, &reason).is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_rejected_b1_returns_envelopes_to_pool() {
        let coordinator = test_coordinator();
        assert!(coordinator.submit_pht(test_pht(1, 0).0).await);
        assert!(coordinator.submit_pht(test_pht(1, 1).0).await);

        let block = coordinator.assemble_b1_at(5, 1, keypair(0)).await.unwrap();
        assert_eq!(block.phts.len(), 2);
        assert_eq!(coordinator.pool.len().await, 0);

        let reason = ConsensusError::ParentMismatch {
            expected: "00".repeat(32),
            got: "11".repeat(32),
        };
        let events = coordinator.on_rejected_b1(&block, &reason).await;

        assert!(events.is_empty(), "a parent race is not misbehavior");
        assert_eq!(coordinator.pool.len().await, 2);
    }

    #[test_log::test(tokio::test)]
    async fn test_malformed_b1_rejection_penalizes_proposer() {
        let coordinator = test_coordinator();
        coordinator.submit_pht(test_pht(1, 0).0).await;
        let block = coordinator.assemble_b1_at(5, 1, keypair(0)).await.unwrap();

        let reason = ConsensusError::DuplicateCommitment {
            commitment: "bb".repeat(32),
        };
        let events = coordinator.on_rejected_b1(&block, &reason).await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, Outcome::ProposedInvalidBlock);
        assert_eq!(events[0].address, keypair(0).address());
    }

    /// Two conflicting phase-1 blocks for one round, signed by one key.
    fn conflicting_b1_evidence(round: u64) -> EquivocationEvidence {
        let block_a = B1Block::new(round, 1, [1u8; 32], Vec::new(), keypair(0)).unwrap();
        let block_b = B1Block::new(round, 1, [2u8; 32], Vec::new(), keypair(0)).unwrap();

        EquivocationEvidence {
            round,
            phase: BlockPhase::B1,
            address: keypair(0).address(),
            pubkey: keypair(0).public.clone(),
            header_a: block_a.header_bytes().unwrap(),
            signature_a: block_a.signature,
            header_b: block_b.header_bytes().unwrap(),
            signature_b: block_b.signature,
        }
    }

    #[test]
    fn test_equivocation_evidence_slashes_once() {
        let coordinator = test_coordinator();
        let evidence = conflicting_b1_evidence(5);

        let first = coordinator.report_equivocation(&evidence).unwrap();
        assert_eq!(first.unwrap().outcome, Outcome::ProposedInvalidBlock);

        let replay = coordinator.report_equivocation(&evidence).unwrap();
        assert!(replay.is_none());
    }

    #[test]
    fn test_equivocation_evidence_is_verified() {
        let coordinator = test_coordinator();
        let template = conflicting_b1_evidence(5);

        let same_headers = EquivocationEvidence {
            header_b: template.header_a.clone(),
            signature_b: template.signature_a.clone(),
            ..template.clone()
        };
        assert!(matches!(
            coordinator.report_equivocation(&same_headers),
            Err(ConsensusError::InvalidEvidence { .. })
        ));

        let undecodable = EquivocationEvidence {
            header_a: b"not a header".to_vec(),
            ..template.clone()
        };
        assert!(matches!(
            coordinator.report_equivocation(&undecodable),
            Err(ConsensusError::InvalidEvidence { .. })
        ));

        // Headers naming one proposer cannot implicate another validator.
        let misattributed = EquivocationEvidence {
            address: keypair(1).address(),
            pubkey: keypair(1).public.clone(),
            ..template.clone()
        };
        assert!(matches!(
            coordinator.report_equivocation(&misattributed),
            Err(ConsensusError::InvalidEvidence { .. })
        ));

        // Signatures that do not cover the headers they accompany.
        let swapped = EquivocationEvidence {
            signature_a: template.signature_b.clone(),
            signature_b: template.signature_a.clone(),
            ..template
        };
        assert!(matches!(
            coordinator.report_equivocation(&swapped),
            Err(ConsensusError::BadSignature { .. })
        ));

        assert!(coordinator.registry().history().is_empty());
    }

    #[test]
    fn test_equivocation_requires_headers_from_the_claimed_round() {
        let coordinator = test_coordinator();

        // Two honest proposals from consecutive rounds, both public record.
        let round_5 = B1Block::new(5, 1, [1u8; 32], Vec::new(), keypair(0)).unwrap();
        let round_6 = B1Block::new(6, 2, [2u8; 32], Vec::new(), keypair(0)).unwrap();
        let stake_before = coordinator
            .registry()
            .record(&keypair(0).address())
            .unwrap()
            .stake;

        let evidence = EquivocationEvidence {
            round: 5,
            phase: BlockPhase::B1,
            address: keypair(0).address(),
            pubkey: keypair(0).public.clone(),
            header_a: round_5.header_bytes().unwrap(),
            signature_a: round_5.signature.clone(),
            header_b: round_6.header_bytes().unwrap(),
            signature_b: round_6.signature.clone(),
        };
        assert!(matches!(
            coordinator.report_equivocation(&evidence),
            Err(ConsensusError::InvalidEvidence { .. })
        ));

        // Re-claiming the same pair under later rounds cannot grind stake.
        for claimed in [6, 7] {
            let reclaim = EquivocationEvidence {
                round: claimed,
                ..evidence.clone()
            };
            assert!(coordinator.report_equivocation(&reclaim).is_err());
        }

        let registry = coordinator.registry();
        assert!(registry.history().is_empty());
        assert_eq!(
            registry.record(&keypair(0).address()).unwrap().stake,
            stake_before
        );
    }

    #[test]
    fn test_same_round_b1_and_b2_headers_are_not_equivocation() {
        let coordinator = test_coordinator();

        // A round's proposer legitimately signs a phase-1 block and the
        // phase-2 block of an earlier pairing in the same round.
        let b1 = B1Block::new(6, 2, [1u8; 32], Vec::new(), keypair(0)).unwrap();
        let b2 = B2Block::new(6, 3, [9u8; 32], Vec::new(), keypair(0)).unwrap();

        let evidence = EquivocationEvidence {
            round: 6,
            phase: BlockPhase::B1,
            address: keypair(0).address(),
            pubkey: keypair(0).public.clone(),
            header_a: b1.header_bytes().unwrap(),
            signature_a: b1.signature.clone(),
            header_b: b2.header_bytes().unwrap(),
            signature_b: b2.signature.clone(),
        };
        assert!(matches!(
            coordinator.report_equivocation(&evidence),
            Err(ConsensusError::BadSignature { .. })
        ));
        assert!(coordinator.registry().history().is_empty());
    }

    #[test]
    fn test_validity_predicates_resolve_coordinator_state() {
        let coordinator = test_coordinator();
        coordinator.on_round_advanced(5, b"seed-5");
        coordinator.on_round_advanced(6, b"seed-6");

        let proposer_5 = coordinator.expected_proposer(5).unwrap();
        let keys_5 = keypair_for(&proposer_5);
        let (pht, secret) = test_pht(1, 0);
        coordinator.store_secret(secret).unwrap();

        let (tip, height) = coordinator.tip();
        let b1 = B1Block::new(5, height + 1, tip, vec![pht], keys_5).unwrap();
        coordinator.validate_b1(&b1).unwrap();
        coordinator.on_finalized_b1(&b1).unwrap();

        let proposer_6 = coordinator.expected_proposer(6).unwrap();
        let keys_6 = keypair_for(&proposer_6);
        let b2 = coordinator
            .assemble_b2_for(&b1.hash().unwrap(), 6, height + 2, keys_6)
            .unwrap();
        coordinator.validate_b2(&b2).unwrap();
    }

    #[test]
    fn test_validate_b2_requires_finalized_b1() {
        let coordinator = test_coordinator();
        coordinator.on_round_advanced(6, b"seed-6");

        let (pht, secret) = test_pht(1, 0);
        let b1 = B1Block::new(5, 1, GENESIS, vec![pht.clone()], keypair(0)).unwrap();
        let mt = p2s_core::reveal(&pht, &secret).unwrap();
        let b2 = B2Block::new(6, 2, b1.hash().unwrap(), vec![mt], keypair(0)).unwrap();

        assert!(matches!(
            coordinator.validate_b2(&b2),
            Err(ConsensusError::B1NotFinalized { .. })
        ));
    }

    #[test]
    fn test_validation_needs_a_seed() {
        let coordinator = test_coordinator();
        let b1 = B1Block::new(9, 1, GENESIS, Vec::new(), keypair(0)).unwrap();

        assert!(matches!(
            coordinator.validate_b1(&b1),
            Err(ConsensusError::SeedUnavailable { round: 9 })
        ));
    }
}
