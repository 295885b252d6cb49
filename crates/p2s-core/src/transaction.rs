use crate::errors::CoreResult;
use chrono::Utc;
use p2s_crypto::{derive_address, HashFunctions, SphincsKeypair, SphincsPublicKey, SphincsSignature, SphincsSignatureScheme};
use serde::{Serialize, Deserialize};

/// A signed transfer with designated sensitive fields.
///
/// The sensitive fields (recipient, value, call data) are what the two-phase
/// protocol hides during phase 1; sender, nonce, gas limit and timestamp stay
/// public for fee-market and replay-protection purposes. Immutable once
/// signed: the signature covers every field above it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,           // Derived from the sender's public key
    pub recipient: String,        // Sensitive
    pub value: u128,              // Sensitive
    pub call_data: Vec<u8>,       // Sensitive
    pub nonce: u64,
    pub gas_limit: u64,
    pub timestamp: i64,
    pub sender_pubkey: SphincsPublicKey,
    pub signature: SphincsSignature,
}

impl Transaction {
    /// Create and sign a transaction with the sender's keypair.
    pub fn new(
        keypair: &SphincsKeypair,
        recipient: &str,
        value: u128,
        call_data: Vec<u8>,
        nonce: u64,
        gas_limit: u64,
    ) -> CoreResult<Self> {
        let sender = keypair.address();
        let timestamp = Utc::now().timestamp();

        let payload = signing_bytes(&sender, recipient, value, &call_data, nonce, gas_limit, timestamp)?;
        let signature = keypair.sign(&payload)?;

        Ok(Self {
            sender,
            recipient: recipient.to_string(),
            value,
            call_data,
            nonce,
            gas_limit,
            timestamp,
            sender_pubkey: keypair.public.clone(),
            signature,
        })
    }

    /// Verify the sender signature over the full transaction.
    pub fn verify_signature(&self) -> bool {
        if derive_address(&self.sender_pubkey) != self.sender {
            return false;
        }

        let payload = match self.full_signing_bytes() {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        SphincsSignatureScheme::verify(&payload, &self.signature, &self.sender_pubkey).is_ok()
    }

    /// Canonical encoding of the sensitive fields; the commitment preimage.
    pub fn sensitive_bytes(&self) -> CoreResult<Vec<u8>> {
        encode_sensitive(&self.recipient, self.value, &self.call_data)
    }

    /// Unique transaction hash (covers the signature as well).
    pub fn hash(&self) -> CoreResult<[u8; 32]> {
        let mut bytes = self.full_signing_bytes()?;
        bytes.extend_from_slice(self.signature.as_bytes());
        Ok(HashFunctions::sha3_256(&bytes))
    }

    fn full_signing_bytes(&self) -> CoreResult<Vec<u8>> {
        signing_bytes(
            &self.sender,
            &self.recipient,
            self.value,
            &self.call_data,
            self.nonce,
            self.gas_limit,
            self.timestamp,
        )
    }
}

/// Canonical signing encoding over all transaction fields.
fn signing_bytes(
    sender: &str,
    recipient: &str,
    value: u128,
    call_data: &[u8],
    nonce: u64,
    gas_limit: u64,
    timestamp: i64,
) -> CoreResult<Vec<u8>> {
    let bytes = bincode::serialize(&(sender, recipient, value, call_data, nonce, gas_limit, timestamp))?;
    Ok(bytes)
}

/// Canonical encoding of a sensitive-field tuple.
///
/// Shared by the transaction itself and by reveal secrets so that both sides
/// of a commitment hash exactly the same bytes.
pub fn encode_sensitive(recipient: &str, value: u128, call_data: &[u8]) -> CoreResult<Vec<u8>> {
    let bytes = bincode::serialize(&(recipient, value, call_data))?;
    Ok(bytes)
}
