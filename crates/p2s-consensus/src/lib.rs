// === Protocol Parameters and Rounds ===
pub mod config;
pub mod round;

// === Validator Set and Selection ===
pub mod registry;
pub mod selection;

// === Block Pipelines ===
pub mod b1;
pub mod b2;

// === Pairing and Finality ===
pub mod coordinator;

// === Error Types ===
pub mod errors;

// === Re-exports for broader ecosystem access ===
pub use b1::{assemble_b1, validate_b1, B1Context};
pub use b2::{assemble_b2, validate_b2, B2Context};
pub use config::ProtocolConfig;
pub use coordinator::{
    EquivocationEvidence, Pairing, PairingCoordinator, PairingView, PhaseValidity,
};
pub use errors::{ConsensusError, ConsensusResult};
pub use registry::{BootstrapEntry, Outcome, OutcomeEvent, ValidatorRecord, ValidatorRegistry};
pub use round::{check_activation, RevealWindow, RoundSchedule};
pub use selection::{select_proposer, stake_weight};
