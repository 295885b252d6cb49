// Consensus-layer errors with detailed context.
//
// Every rejection carries the data needed to log, audit, or escalate it.
// Validation failures are local and recoverable; nothing here halts the
// chain.

use std::fmt;

/// Errors raised while validating phase blocks, selecting proposers, or
/// mutating the validator registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// A reveal does not reproduce the commitment it claims to open
    CommitmentMismatch { commitment: String, position: usize },

    /// No hidden transaction in the referenced phase-1 block carries this commitment
    UnknownCommitment { commitment: String },

    /// A hidden transaction was claimed by more than one reveal
    AlreadyMatched { commitment: String },

    /// The reveal opens the commitment but restates the envelope's public fields wrongly
    EnvelopeMismatch { commitment: String },

    /// Phase-2 block proposed outside the reveal window of its phase-1 block
    WindowExpired { b1_hash: String, close_round: u64, round: u64 },

    /// Block signer is not the proposer selected for the round
    ProposerMismatch { expected: String, got: String, round: u64 },

    /// Block height predates protocol activation
    BeforeActivation { height: u64, activation_height: u64 },

    /// Phase-1 block does not extend the expected chain tip
    ParentMismatch { expected: String, got: String },

    /// The same commitment appears twice within one phase-1 block
    DuplicateCommitment { commitment: String },

    /// Reveal ordering does not mirror the phase-1 ordering
    OrderingViolation { position: usize, prev_index: usize, index: usize },

    /// Encoded payload exceeds the block size limit
    PayloadTooLarge { bytes: usize, limit: usize },

    /// Payload carries more transactions than the per-block limit
    TooManyPhts { count: usize, limit: usize },

    /// Phase-2 block carries more reveals than the per-block limit
    TooManyMts { count: usize, limit: usize },

    /// Phase-2 block reveals nothing
    EmptyBlock,

    /// A signature did not verify under the stated public key
    BadSignature { who: String },

    /// Phase-2 block references a phase-1 block that is not finalized
    B1NotFinalized { b1_hash: String },

    /// Referenced block is unknown to the coordinator
    UnknownBlock { hash: String },

    /// No active validator is available for selection
    EmptyValidatorSet,

    /// Outcome reported against an address absent from the registry
    UnknownValidator { address: String },

    /// Bootstrap carries the same address twice
    DuplicateValidator { address: String },

    /// Bootstrap exceeds the validator-set cap
    RegistryFull { capacity: usize },

    /// Protocol configuration failed validation
    InvalidConfig { reason: String },

    /// Validator bootstrap data failed validation
    InvalidBootstrap { reason: String },

    /// Equivocation evidence is malformed or does not prove anything
    InvalidEvidence { reason: String },

    /// No seed has been supplied for the round under validation
    SeedUnavailable { round: u64 },

    /// Header payload root does not match the carried payload
    RootMismatch { expected: String, got: String },

    /// Generic consensus error
    Other(String),
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusError::CommitmentMismatch { commitment, position } => {
                write!(f, "Reveal at position {} does not reproduce commitment {}", position, commitment)
            }
            ConsensusError::UnknownCommitment { commitment } => {
                write!(f, "No hidden transaction in the referenced block carries commitment {}", commitment)
            }
            ConsensusError::AlreadyMatched { commitment } => {
                write!(f, "Commitment {} was already matched by an earlier reveal", commitment)
            }
            ConsensusError::EnvelopeMismatch { commitment } => {
                write!(f, "Reveal opens commitment {} but misstates the envelope's public fields", commitment)
            }
            ConsensusError::WindowExpired { b1_hash, close_round, round } => {
                write!(f, "Phase-2 block for {} at round {} is outside the reveal window closing after round {}", b1_hash, round, close_round)
            }
            ConsensusError::ProposerMismatch { expected, got, round } => {
                write!(f, "Round {} proposer mismatch: expected {}, got {}", round, expected, got)
            }
            ConsensusError::BeforeActivation { height, activation_height } => {
                write!(f, "Block height {} predates protocol activation at height {}", height, activation_height)
            }
            ConsensusError::ParentMismatch { expected, got } => {
                write!(f, "Parent hash mismatch: expected {}, got {}", expected, got)
            }
            ConsensusError::DuplicateCommitment { commitment } => {
                write!(f, "Commitment {} appears more than once in the block", commitment)
            }
            ConsensusError::OrderingViolation { position, prev_index, index } => {
                write!(f, "Reveal at position {} matches index {} after index {}; ordering must mirror the phase-1 block", position, index, prev_index)
            }
            ConsensusError::PayloadTooLarge { bytes, limit } => {
                write!(f, "Encoded payload is {} bytes, limit is {}", bytes, limit)
            }
            ConsensusError::TooManyPhts { count, limit } => {
                write!(f, "Payload carries {} transactions, limit is {}", count, limit)
            }
            ConsensusError::TooManyMts { count, limit } => {
                write!(f, "Phase-2 block carries {} reveals, limit is {}", count, limit)
            }
            ConsensusError::EmptyBlock => {
                write!(f, "Phase-2 block reveals no transactions")
            }
            ConsensusError::BadSignature { who } => {
                write!(f, "Invalid signature from {}", who)
            }
            ConsensusError::B1NotFinalized { b1_hash } => {
                write!(f, "Referenced phase-1 block {} is not finalized", b1_hash)
            }
            ConsensusError::UnknownBlock { hash } => {
                write!(f, "Unknown block {}", hash)
            }
            ConsensusError::EmptyValidatorSet => {
                write!(f, "No active validator is available for selection")
            }
            ConsensusError::UnknownValidator { address } => {
                write!(f, "Validator {} not found in the registry", address)
            }
            ConsensusError::DuplicateValidator { address } => {
                write!(f, "Validator {} already registered", address)
            }
            ConsensusError::RegistryFull { capacity } => {
                write!(f, "Validator registry is at capacity ({})", capacity)
            }
            ConsensusError::InvalidConfig { reason } => {
                write!(f, "Invalid protocol configuration: {}", reason)
            }
            ConsensusError::InvalidBootstrap { reason } => {
                write!(f, "Invalid validator bootstrap: {}", reason)
            }
            ConsensusError::InvalidEvidence { reason } => {
                write!(f, "Invalid equivocation evidence: {}", reason)
            }
            ConsensusError::SeedUnavailable { round } => {
                write!(f, "No selection seed supplied for round {}", round)
            }
            ConsensusError::RootMismatch { expected, got } => {
                write!(f, "Payload root mismatch: header says {}, payload yields {}", expected, got)
            }
            ConsensusError::Other(msg) => write!(f, "Consensus error: {}", msg),
        }
    }
}

impl std::error::Error for ConsensusError {}

impl From<p2s_core::CoreError> for ConsensusError {
    fn from(err: p2s_core::CoreError) -> Self {
        ConsensusError::Other(err.to_string())
    }
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;
