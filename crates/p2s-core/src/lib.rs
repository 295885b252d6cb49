// === Two-Phase Transactions ===
pub mod transaction;
pub mod pht;
pub mod mt;

// === Paired Blocks and Lifecycles ===
pub mod block;

// === Local Custody and Admission ===
pub mod pht_pool;
pub mod secret_store;

// === Error Types ===
pub mod errors;

// === Re-exports for broader ecosystem access ===
pub use block::{verify_header_signature, B1Block, B1Status, B2Block, B2Status, BlockHeader, BlockPhase, PhtStatus};
pub use errors::{CoreError, CoreResult, MatchError, RevealError};
pub use mt::{check_against_b1, reveal, MatchingTx};
pub use pht::{build_pht, PartiallyHiddenTx, RevealSecret};
pub use pht_pool::PendingPool;
pub use secret_store::SecretStore;
pub use transaction::{encode_sensitive, Transaction};
