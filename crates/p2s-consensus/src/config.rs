use crate::errors::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};

/// Protocol parameter set, fixed at chain initialization.
///
/// Changing any of these after activation requires a coordinated fork; all
/// nodes must validate blocks against identical parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Height at which two-phase validation starts being enforced
    pub activation_height: u64,

    /// Rounds a finalized phase-1 block waits for its phase-2 block
    pub reveal_window_rounds: u64,

    /// Maximum hidden transactions per phase-1 block
    pub max_phts_per_block: usize,

    /// Maximum reveals per phase-2 block
    pub max_mts_per_block: usize,

    /// Maximum encoded payload bytes for either phase
    pub max_payload_bytes: usize,

    /// Minimum stake to participate, in 18-decimal base units
    pub min_validator_stake: u128,

    /// Validator-set cap
    pub max_validators: usize,

    /// Stake fraction slashed on a missed reveal, in basis points
    pub slash_missed_reveal_bps: u32,

    /// Stake fraction slashed on an invalid block, in basis points
    pub slash_invalid_block_bps: u32,

    /// Reputation below which a validator is deactivated
    pub reputation_floor: f64,

    /// Wall-clock length of the phase-1 slot, informational to the host
    pub b1_slot_secs: u64,

    /// Wall-clock length of the phase-2 slot, informational to the host
    pub b2_slot_secs: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            activation_height: 0,
            reveal_window_rounds: 2,
            max_phts_per_block: 100,
            max_mts_per_block: 100,
            max_payload_bytes: 1 << 20,
            min_validator_stake: 1_000_000_000_000_000_000,
            max_validators: 100,
            slash_missed_reveal_bps: 500,
            slash_invalid_block_bps: 1_000,
            reputation_floor: 0.2,
            b1_slot_secs: 6,
            b2_slot_secs: 6,
        }
    }
}

impl ProtocolConfig {
    /// Check the parameter set for internal consistency.
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.reveal_window_rounds == 0 {
            return Err(ConsensusError::InvalidConfig {
                reason: "reveal_window_rounds must be > 0".to_string(),
            });
        }
        if self.max_phts_per_block == 0 || self.max_mts_per_block == 0 {
            return Err(ConsensusError::InvalidConfig {
                reason: "per-block transaction limits must be > 0".to_string(),
            });
        }
        if self.max_payload_bytes == 0 {
            return Err(ConsensusError::InvalidConfig {
                reason: "max_payload_bytes must be > 0".to_string(),
            });
        }
        if self.min_validator_stake == 0 {
            return Err(ConsensusError::InvalidConfig {
                reason: "min_validator_stake must be > 0".to_string(),
            });
        }
        if self.max_validators == 0 {
            return Err(ConsensusError::InvalidConfig {
                reason: "max_validators must be > 0".to_string(),
            });
        }
        if self.slash_missed_reveal_bps > 10_000 || self.slash_invalid_block_bps > 10_000 {
            return Err(ConsensusError::InvalidConfig {
                reason: "slash fractions cannot exceed 10000 basis points".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.reputation_floor) {
            return Err(ConsensusError::InvalidConfig {
                reason: "reputation_floor must be in [0, 1)".to_string(),
            });
        }
        if self.b1_slot_secs == 0 || self.b2_slot_secs == 0 {
            return Err(ConsensusError::InvalidConfig {
                reason: "slot durations must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Parse and validate a configuration from its JSON rendering.
    pub fn from_json(json: &str) -> ConsensusResult<Self> {
        let config: ProtocolConfig = serde_json::from_str(json).map_err(|e| {
            ConsensusError::InvalidConfig {
                reason: format!("malformed JSON: {}", e),
            }
        })?;
        config.validate()?;
        Ok(config)
    }
}
