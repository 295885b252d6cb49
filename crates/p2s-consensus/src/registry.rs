// Validator ledger for the two-phase protocol.
//
// SAFETY INVARIANTS:
// 1. The active set only ever contains validators that satisfy the stake
//    minimum and the reputation floor; every mutation re-checks both.
// 2. Reputation stays inside [0.0, 1.0] after every update.
// 3. An outcome is applied at most once per (validator, round, kind); replays
//    return None instead of double-counting.
// 4. Stake arithmetic saturates, it never wraps.

use crate::config::ProtocolConfig;
use crate::errors::{ConsensusError, ConsensusResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Per-round outcome attributed to a validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    /// Proposed a phase-1 block that finalized
    ProposedValidB1,
    /// Proposed a phase-2 block that finalized
    ProposedValidB2,
    /// Let a reveal window close without any accepted phase-2 block
    MissedReveal,
    /// Proposed a block rejected for a protocol violation
    ProposedInvalidBlock,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::ProposedValidB1 => "proposed_valid_b1",
            Outcome::ProposedValidB2 => "proposed_valid_b2",
            Outcome::MissedReveal => "missed_reveal",
            Outcome::ProposedInvalidBlock => "proposed_invalid_block",
        }
    }
}

/// One validator row of the bootstrap set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapEntry {
    pub address: String,
    pub stake: u128,
    pub reputation: f64,
    pub active: bool,
}

/// Live ledger entry for one validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub address: String,
    pub stake: u128,
    pub reputation: f64,
    pub active: bool,
    pub proposed_b1: u64,
    pub proposed_b2: u64,
    pub missed_reveals: u64,
    pub invalid_blocks: u64,
    pub total_slashed: u128,
    pub joined_round: u64,
}

impl ValidatorRecord {
    fn from_bootstrap(entry: &BootstrapEntry, joined_round: u64) -> Self {
        ValidatorRecord {
            address: entry.address.clone(),
            stake: entry.stake,
            reputation: entry.reputation,
            active: entry.active,
            proposed_b1: 0,
            proposed_b2: 0,
            missed_reveals: 0,
            invalid_blocks: 0,
            total_slashed: 0,
            joined_round,
        }
    }

    /// True when this validator may appear in proposer selection.
    pub fn can_propose(&self, config: &ProtocolConfig) -> bool {
        self.active
            && self.stake >= config.min_validator_stake
            && self.reputation >= config.reputation_floor
    }
}

impl fmt::Display for ValidatorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Validator {} stake={} rep={:.3} active={} b1={} b2={} missed={} invalid={}",
            self.address,
            self.stake,
            self.reputation,
            self.active,
            self.proposed_b1,
            self.proposed_b2,
            self.missed_reveals,
            self.invalid_blocks
        )
    }
}

/// Audit record for one applied outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub round: u64,
    pub address: String,
    pub outcome: Outcome,
    pub reputation_before: f64,
    pub reputation_after: f64,
    pub stake_before: u128,
    pub stake_after: u128,
    pub slashed: u128,
    pub recorded_at: DateTime<Utc>,
}

/// The validator set plus its outcome history.
///
/// Selection reads the sorted active snapshot, the coordinator feeds round
/// outcomes back in, and the history vector keeps the full audit trail of
/// every reputation and stake change.
#[derive(Debug)]
pub struct ValidatorRegistry {
    config: ProtocolConfig,
    validators: HashMap<String, ValidatorRecord>,
    active: BTreeSet<String>,
    history: Vec<OutcomeEvent>,
    applied: HashSet<(String, u64, Outcome)>,
}

impl ValidatorRegistry {
    /// Build a registry from a validated bootstrap set.
    pub fn load(
        config: ProtocolConfig,
        entries: &[BootstrapEntry],
        joined_round: u64,
    ) -> ConsensusResult<Self> {
        config.validate()?;

        if entries.is_empty() {
            return Err(ConsensusError::EmptyValidatorSet);
        }
        if entries.len() > config.max_validators {
            return Err(ConsensusError::RegistryFull {
                capacity: config.max_validators,
            });
        }

        let mut validators = HashMap::with_capacity(entries.len());
        let mut active = BTreeSet::new();

        for entry in entries {
            if entry.stake < config.min_validator_stake {
                return Err(ConsensusError::InvalidBootstrap {
                    reason: format!(
                        "validator {} stake {} is below the minimum {}",
                        entry.address, entry.stake, config.min_validator_stake
                    ),
                });
            }
            if !(0.0..=1.0).contains(&entry.reputation) {
                return Err(ConsensusError::InvalidBootstrap {
                    reason: format!(
                        "validator {} reputation {} is outside [0, 1]",
                        entry.address, entry.reputation
                    ),
                });
            }
            if validators.contains_key(&entry.address) {
                return Err(ConsensusError::DuplicateValidator {
                    address: entry.address.clone(),
                });
            }

            let record = ValidatorRecord::from_bootstrap(entry, joined_round);
            if record.can_propose(&config) {
                active.insert(record.address.clone());
            } else if entry.active {
                log::warn!(
                    "Bootstrap validator {} marked active but below the reputation floor, loading as inactive",
                    entry.address
                );
            }
            validators.insert(entry.address.clone(), record);
        }

        log::info!(
            "Validator registry loaded: {} validators, {} active",
            validators.len(),
            active.len()
        );

        Ok(ValidatorRegistry {
            config,
            validators,
            active,
            history: Vec::new(),
            applied: HashSet::new(),
        })
    }

    /// Build a registry from the JSON rendering of a bootstrap set.
    pub fn load_json(config: ProtocolConfig, json: &str, joined_round: u64) -> ConsensusResult<Self> {
        let entries: Vec<BootstrapEntry> =
            serde_json::from_str(json).map_err(|e| ConsensusError::InvalidBootstrap {
                reason: format!("malformed JSON: {}", e),
            })?;
        Self::load(config, &entries, joined_round)
    }

    /// Apply one outcome to one validator.
    ///
    /// Returns `Ok(None)` when the same (validator, round, outcome) triple was
    /// already applied; the caller can report a miss or a violation through
    /// several paths without double-slashing.
    pub fn apply_outcome(
        &mut self,
        round: u64,
        address: &str,
        outcome: Outcome,
    ) -> ConsensusResult<Option<OutcomeEvent>> {
        if !self.validators.contains_key(address) {
            return Err(ConsensusError::UnknownValidator {
                address: address.to_string(),
            });
        }

        let key = (address.to_string(), round, outcome);
        if self.applied.contains(&key) {
            log::debug!(
                "Outcome {} for {} at round {} already applied, skipping",
                outcome.as_str(),
                address,
                round
            );
            return Ok(None);
        }

        let record = match self.validators.get_mut(address) {
            Some(record) => record,
            None => {
                return Err(ConsensusError::UnknownValidator {
                    address: address.to_string(),
                })
            }
        };

        let reputation_before = record.reputation;
        let stake_before = record.stake;

        let slash_bps = match outcome {
            Outcome::ProposedValidB1 => {
                record.proposed_b1 += 1;
                record.reputation = (record.reputation + 0.01).min(1.0);
                0u32
            }
            Outcome::ProposedValidB2 => {
                record.proposed_b2 += 1;
                record.reputation = (record.reputation + 0.02).min(1.0);
                0u32
            }
            Outcome::MissedReveal => {
                record.missed_reveals += 1;
                record.reputation *= 0.75;
                self.config.slash_missed_reveal_bps
            }
            Outcome::ProposedInvalidBlock => {
                record.invalid_blocks += 1;
                record.reputation *= 0.5;
                self.config.slash_invalid_block_bps
            }
        };
        record.reputation = record.reputation.clamp(0.0, 1.0);

        let slashed = stake_before.saturating_mul(slash_bps as u128) / 10_000;
        record.stake = record.stake.saturating_sub(slashed);
        record.total_slashed = record.total_slashed.saturating_add(slashed);

        if record.active && !record.can_propose(&self.config) {
            record.active = false;
            self.active.remove(address);
            log::warn!(
                "Validator {} deactivated after {}: stake={} reputation={:.4}",
                address,
                outcome.as_str(),
                record.stake,
                record.reputation
            );
        }

        let event = OutcomeEvent {
            round,
            address: address.to_string(),
            outcome,
            reputation_before,
            reputation_after: record.reputation,
            stake_before,
            stake_after: record.stake,
            slashed,
            recorded_at: Utc::now(),
        };

        if slashed > 0 {
            log::warn!(
                "Validator {} slashed {} for {} at round {}",
                address,
                slashed,
                outcome.as_str(),
                round
            );
        } else {
            log::debug!(
                "Validator {} credited {} at round {}",
                address,
                outcome.as_str(),
                round
            );
        }

        self.applied.insert(key);
        self.history.push(event.clone());
        Ok(Some(event))
    }

    /// Apply a batch of outcomes in a deterministic order.
    ///
    /// Outcomes are sorted by (address, kind) before application so every
    /// node derives the same history regardless of discovery order. Unknown
    /// validators are skipped with a warning; window expiry can outlive a
    /// validator's membership.
    pub fn apply_outcome_batch(
        &mut self,
        round: u64,
        outcomes: &[(String, Outcome)],
    ) -> Vec<OutcomeEvent> {
        let mut sorted: Vec<&(String, Outcome)> = outcomes.iter().collect();
        sorted.sort();

        let mut events = Vec::new();
        for (address, outcome) in sorted {
            match self.apply_outcome(round, address, *outcome) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(ConsensusError::UnknownValidator { address }) => {
                    log::warn!(
                        "Skipping outcome for unknown validator {} at round {}",
                        address,
                        round
                    );
                }
                Err(e) => {
                    log::error!("Failed to apply outcome at round {}: {}", round, e);
                }
            }
        }
        events
    }

    /// Sorted (address, stake, reputation) rows for every selectable validator.
    pub fn active_snapshot(&self) -> Vec<(String, u128, f64)> {
        self.active
            .iter()
            .filter_map(|address| {
                self.validators
                    .get(address)
                    .map(|record| (record.address.clone(), record.stake, record.reputation))
            })
            .collect()
    }

    pub fn total_active_stake(&self) -> u128 {
        self.active
            .iter()
            .filter_map(|address| self.validators.get(address))
            .fold(0u128, |total, record| total.saturating_add(record.stake))
    }

    pub fn contains(&self, address: &str) -> bool {
        self.validators.contains_key(address)
    }

    pub fn record(&self, address: &str) -> Option<&ValidatorRecord> {
        self.validators.get(address)
    }

    pub fn history(&self) -> &[OutcomeEvent] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }
}
