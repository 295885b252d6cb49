use crate::pht::PartiallyHiddenTx;
use p2s_crypto::Commitment;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

struct PoolInner {
    queue: VecDeque<PartiallyHiddenTx>,   // FIFO by submission time
    seen: HashSet<Commitment>,            // Every commitment ever admitted
}

/// Pending pool of hidden transactions awaiting phase-1 inclusion.
///
/// FIFO by submission order, bounded, with duplicate suppression over the
/// pool's whole lifetime: a commitment is admitted at most once, ever, so a
/// stale or missed envelope cannot be replayed. Envelopes from a rejected
/// phase-1 block re-enter at the front, keeping their original priority.
pub struct PendingPool {
    inner: Mutex<PoolInner>,
    max_size: usize,
}

impl PendingPool {
    /// Initializes a new pool with a defined max size.
    pub fn new(max_size: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(PoolInner {
                queue: VecDeque::with_capacity(max_size),
                seen: HashSet::new(),
            }),
            max_size,
        })
    }

    /// Submit an envelope for future phase-1 inclusion.
    ///
    /// Returns false (with a logged reason) when the envelope is malformed,
    /// a duplicate, a replay of a commitment seen before, or the pool is at
    /// capacity.
    pub async fn submit(&self, pht: PartiallyHiddenTx) -> bool {
        if !pht.verify_envelope() {
            log::error!(
                "Envelope validation failed for commitment {}: bad sender signature",
                pht.commitment
            );
            return false;
        }

        let mut inner = self.inner.lock().await;

        if inner.seen.contains(&pht.commitment) {
            log::warn!(
                "Refusing replayed commitment {}; a fresh commitment is required",
                pht.commitment
            );
            return false;
        }

        if inner.queue.len() >= self.max_size {
            log::warn!(
                "Pending pool at capacity ({}); dropping commitment {}",
                self.max_size,
                pht.commitment
            );
            return false;
        }

        inner.seen.insert(pht.commitment);
        inner.queue.push_back(pht);

        log::debug!("Envelope admitted to pending pool. Total: {}", inner.queue.len());

        true
    }

    /// Drain envelopes FIFO for a phase-1 payload, bounded by count and by
    /// encoded payload bytes.
    ///
    /// An envelope that does not fit the remaining byte budget goes back to
    /// the front for the next round; one that could never fit any block is
    /// dropped with an error.
    pub async fn drain_for_block(&self, max_count: usize, max_bytes: usize) -> Vec<PartiallyHiddenTx> {
        let mut inner = self.inner.lock().await;
        let mut selected = Vec::new();
        let mut used_bytes = 0usize;

        while selected.len() < max_count {
            let pht = match inner.queue.pop_front() {
                Some(pht) => pht,
                None => break,
            };

            let len = match pht.encoded_len() {
                Ok(len) => len,
                Err(e) => {
                    log::error!("Dropping unencodable envelope {}: {}", pht.commitment, e);
                    continue;
                }
            };

            if len > max_bytes {
                log::error!(
                    "Dropping oversized envelope {} ({} bytes exceeds block payload limit {})",
                    pht.commitment,
                    len,
                    max_bytes
                );
                continue;
            }

            if used_bytes + len > max_bytes {
                inner.queue.push_front(pht);
                break;
            }

            used_bytes += len;
            selected.push(pht);
        }

        selected
    }

    /// Return envelopes from a rejected phase-1 block, preserving their
    /// original relative order at the head of the queue.
    pub async fn return_to_pool(&self, phts: Vec<PartiallyHiddenTx>) {
        let mut inner = self.inner.lock().await;
        for pht in phts.into_iter().rev() {
            inner.seen.insert(pht.commitment);
            inner.queue.push_front(pht);
        }
    }

    /// Whether a commitment was ever admitted.
    pub async fn was_seen(&self, commitment: &Commitment) -> bool {
        self.inner.lock().await.seen.contains(commitment)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.queue.is_empty()
    }
}
