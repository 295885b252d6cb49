use crate::errors::{CoreError, CoreResult};
use crate::pht::RevealSecret;
use p2s_crypto::Commitment;
use std::collections::HashMap;

/// Local custody for reveal secrets, keyed by commitment.
///
/// Owned exclusively by the holding party (transaction originator, or a
/// proposer co-located with it); never shared chain state. Secrets must
/// survive until reveal or window expiry, so the store can be snapshotted
/// for host persistence; losing it before reveal is equivalent to a missed
/// reveal. Removal drops the secret, zeroizing its blinding factor.
#[derive(Default)]
pub struct SecretStore {
    secrets: HashMap<Commitment, RevealSecret>,
}

impl SecretStore {
    pub fn new() -> Self {
        Self { secrets: HashMap::new() }
    }

    /// Store a secret under the commitment it opens.
    pub fn put(&mut self, secret: RevealSecret) -> CoreResult<Commitment> {
        let commitment = secret.commitment()?;

        if self.secrets.contains_key(&commitment) {
            return Err(CoreError::DuplicateSecret {
                commitment: commitment.to_hex(),
            });
        }

        self.secrets.insert(commitment, secret);
        log::debug!("Secret stored for commitment {}. Held: {}", commitment, self.secrets.len());

        Ok(commitment)
    }

    /// Borrow the secret for a commitment, if held. Used at phase-2 assembly
    /// time; the secret stays in custody until its pairing terminates.
    pub fn secret_for(&self, commitment: &Commitment) -> Option<&RevealSecret> {
        self.secrets.get(commitment)
    }

    /// Remove and hand over the secret for a commitment.
    pub fn take(&mut self, commitment: &Commitment) -> Option<RevealSecret> {
        self.secrets.remove(commitment)
    }

    /// Drop the secret for a commitment whose pairing reached a terminal
    /// state. Returns whether anything was held.
    pub fn purge(&mut self, commitment: &Commitment) -> bool {
        let removed = self.secrets.remove(commitment).is_some();
        if removed {
            log::debug!("Secret purged for commitment {}", commitment);
        }
        removed
    }

    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.secrets.contains_key(commitment)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Serialize the held secrets for host persistence.
    pub fn snapshot(&self) -> CoreResult<Vec<u8>> {
        let bytes = bincode::serialize(&self.secrets)?;
        Ok(bytes)
    }

    /// Restore a store from a snapshot taken with `snapshot`.
    pub fn restore(bytes: &[u8]) -> CoreResult<Self> {
        let secrets: HashMap<Commitment, RevealSecret> = bincode::deserialize(bytes)?;
        Ok(Self { secrets })
    }
}
