pub mod commitment;
pub mod merkle;
pub mod pq_sign;

pub use commitment::{BlindingFactor, Commitment, BLINDING_FACTOR_BYTES};
pub use merkle::{payload_root, MerkleError, MerkleProof, MerkleResult, MerkleTree, EMPTY_PAYLOAD_ROOT};
pub use pq_sign::{
    derive_address, CryptoError, CryptoResult, HashFunctions, SphincsKeypair, SphincsPublicKey,
    SphincsSecretKey, SphincsSignature, SphincsSignatureScheme,
};
