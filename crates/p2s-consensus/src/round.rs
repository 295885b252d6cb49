use crate::config::ProtocolConfig;
use crate::errors::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};

/// Reject blocks below the activation height.
///
/// Before activation the chain runs its legacy single-phase pipeline and
/// two-phase blocks are not accepted at all.
pub fn check_activation(height: u64, activation_height: u64) -> ConsensusResult<()> {
    if height < activation_height {
        return Err(ConsensusError::BeforeActivation {
            height,
            activation_height,
        });
    }
    Ok(())
}

/// Rounds during which a finalized phase-1 block accepts its phase-2 block.
///
/// The window opens the round after phase-1 finalization and stays open for a
/// configured number of rounds. A phase-2 block proposed in the finalization
/// round itself is early (the reveal slot has not started); one proposed after
/// the close is a missed reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealWindow {
    opened_at: u64,
    closes_after: u64,
}

impl RevealWindow {
    pub fn new(b1_final_round: u64, window_rounds: u64) -> Self {
        RevealWindow {
            opened_at: b1_final_round,
            closes_after: b1_final_round.saturating_add(window_rounds),
        }
    }

    /// True while `round` falls inside the open window.
    pub fn accepts(&self, round: u64) -> bool {
        round > self.opened_at && round <= self.closes_after
    }

    /// True once the window can no longer accept any round.
    pub fn has_closed(&self, round: u64) -> bool {
        round > self.closes_after
    }

    /// Last round the window accepts.
    pub fn close_round(&self) -> u64 {
        self.closes_after
    }
}

/// Wall-clock schedule derived from the slot durations.
///
/// Validation never consults the clock; this exists so a host can time its
/// proposal loop against the same parameters every node validates with.
#[derive(Debug, Clone, Copy)]
pub struct RoundSchedule {
    b1_slot_secs: u64,
    b2_slot_secs: u64,
}

impl RoundSchedule {
    pub fn from_config(config: &ProtocolConfig) -> Self {
        RoundSchedule {
            b1_slot_secs: config.b1_slot_secs,
            b2_slot_secs: config.b2_slot_secs,
        }
    }

    /// Full round duration: one phase-1 slot followed by one phase-2 slot.
    pub fn round_secs(&self) -> u64 {
        self.b1_slot_secs.saturating_add(self.b2_slot_secs)
    }

    /// Seconds from genesis to the start of `round`.
    pub fn round_start_offset_secs(&self, round: u64) -> u64 {
        round.saturating_mul(self.round_secs())
    }

    /// Seconds from genesis to the start of `round`'s phase-2 slot.
    pub fn b2_slot_offset_secs(&self, round: u64) -> u64 {
        self.round_start_offset_secs(round)
            .saturating_add(self.b1_slot_secs)
    }
}
