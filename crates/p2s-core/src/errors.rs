use thiserror::Error;

/// Error type for data-model operations (encoding, signing, state transitions).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("crypto failure: {0}")]
    Crypto(#[from] p2s_crypto::CryptoError),

    #[error("signer address {got} does not match sender {expected}")]
    SenderMismatch { expected: String, got: String },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("a secret for commitment {commitment} is already stored")]
    DuplicateSecret { commitment: String },
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Failures when opening a hidden transaction with a reveal secret.
#[derive(Debug, Error)]
pub enum RevealError {
    /// The revealed fields and blinding factor do not reproduce the envelope's commitment
    #[error("reveal does not reproduce commitment {commitment}")]
    CommitmentMismatch { commitment: String },

    /// The secret's public fields disagree with the envelope
    #[error("revealed public fields do not match the envelope for commitment {commitment}")]
    PublicFieldMismatch { commitment: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Failures when pairing a revealed transaction against a phase-1 block.
#[derive(Debug, Error)]
pub enum MatchError {
    /// No hidden transaction in the referenced block carries this commitment
    #[error("no hidden transaction in the referenced block carries commitment {commitment}")]
    UnknownCommitment { commitment: String },

    /// An earlier revealed transaction in the same block already claimed this commitment
    #[error("commitment {commitment} was already matched earlier in the block")]
    AlreadyMatched { commitment: String },

    /// The reveal opens the commitment but its public fields disagree with the envelope
    #[error("revealed public fields do not match the envelope carrying commitment {commitment}")]
    EnvelopeMismatch { commitment: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}
