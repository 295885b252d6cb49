// Payload Merkle trees.
//
// Binary SHA3-256 Merkle trees over block payloads: phase-1 headers commit
// to the root over their hidden-transaction commitments, phase-2 headers to
// the root over their revealed-transaction hashes. Inclusion proofs let a
// light verifier check a single payload entry against a header.
//
// Leaf and branch hashes use distinct domain prefixes so an internal node
// can never be replayed as a leaf.

use serde::{Serialize, Deserialize};
use sha3::{Digest, Sha3_256};

const LEAF_PREFIX: u8 = 0x00;
const BRANCH_PREFIX: u8 = 0x01;

/// Root value for an empty payload.
pub const EMPTY_PAYLOAD_ROOT: [u8; 32] = [0u8; 32];

// ==================== ERROR TYPES ====================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MerkleError {
    /// Tree is empty
    EmptyTree,

    /// Leaf not found in tree
    LeafNotFound(u64),

    /// Proof verification failed
    ProofVerificationFailed(String),
}

impl std::fmt::Display for MerkleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MerkleError::EmptyTree => write!(f, "Tree is empty"),
            MerkleError::LeafNotFound(index) => write!(f, "Leaf {} not found", index),
            MerkleError::ProofVerificationFailed(msg) => write!(f, "Proof verification failed: {}", msg),
        }
    }
}

impl std::error::Error for MerkleError {}

pub type MerkleResult<T> = Result<T, MerkleError>;

// ==================== HASHING ====================

fn hash_leaf(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

fn hash_branch(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update([BRANCH_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

// ==================== CORE TYPES ====================

/// Merkle inclusion proof: the sibling path from one leaf up to the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the leaf being proved
    pub leaf_index: u64,

    /// Hash of the leaf
    pub leaf_hash: [u8; 32],

    /// Sibling hashes, one per level, leaf upward
    pub path: Vec<[u8; 32]>,

    /// Root this proof commits to
    pub root: [u8; 32],
}

impl MerkleProof {
    /// Verify this proof against an expected root.
    ///
    /// The leaf index parity at each level decides whether the running hash
    /// is the left or the right input, so ordering cannot be forged.
    pub fn verify(&self, expected_root: &[u8; 32]) -> MerkleResult<()> {
        if self.root != *expected_root {
            return Err(MerkleError::ProofVerificationFailed(
                "Proof root does not match expected root".to_string()
            ));
        }

        let mut current = self.leaf_hash;
        let mut index = self.leaf_index;
        for sibling in &self.path {
            current = if index % 2 == 0 {
                hash_branch(&current, sibling)
            } else {
                hash_branch(sibling, &current)
            };
            index /= 2;
        }

        if current == self.root {
            Ok(())
        } else {
            Err(MerkleError::ProofVerificationFailed(
                "Computed root does not match expected root".to_string()
            ))
        }
    }
}

/// A complete Merkle tree, immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    /// levels[0] holds the leaf hashes, the last level holds only the root
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    /// Build a tree over the given leaf payloads.
    pub fn from_leaves<T: AsRef<[u8]>>(leaves: &[T]) -> MerkleResult<Self> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyTree);
        }

        let mut levels = vec![leaves.iter().map(|l| hash_leaf(l.as_ref())).collect::<Vec<_>>()];

        while levels.last().map(|l| l.len()).unwrap_or(0) > 1 {
            let current = levels.last().ok_or(MerkleError::EmptyTree)?;
            let mut next = Vec::with_capacity((current.len() + 1) / 2);

            for pair in current.chunks(2) {
                let left = &pair[0];
                // Odd node out pairs with itself
                let right = pair.get(1).unwrap_or(left);
                next.push(hash_branch(left, right));
            }

            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// Root hash of the tree.
    pub fn root(&self) -> [u8; 32] {
        // Construction guarantees a final single-hash level
        self.levels[self.levels.len() - 1][0]
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn prove_inclusion(&self, index: usize) -> MerkleResult<MerkleProof> {
        if index >= self.len() {
            return Err(MerkleError::LeafNotFound(index as u64));
        }

        let mut path = Vec::new();
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = position ^ 1;
            if sibling < level.len() {
                path.push(level[sibling]);
            } else {
                // Duplicated odd node: sibling is itself
                path.push(level[position]);
            }
            position /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index as u64,
            leaf_hash: self.levels[0][index],
            path,
            root: self.root(),
        })
    }
}

/// Root over a block payload, `EMPTY_PAYLOAD_ROOT` when the payload is empty.
pub fn payload_root<T: AsRef<[u8]>>(items: &[T]) -> [u8; 32] {
    match MerkleTree::from_leaves(items) {
        Ok(tree) => tree.root(),
        Err(MerkleError::EmptyTree) => EMPTY_PAYLOAD_ROOT,
        // from_leaves has no other failure mode
        Err(_) => EMPTY_PAYLOAD_ROOT,
    }
}
