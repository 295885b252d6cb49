// Post-quantum signatures.
//
// SPHINCS+ (SHA2-128f-simple) signing for transaction envelopes and block
// proposals, wrapped in length-checked newtypes so malformed key or
// signature bytes are rejected at construction rather than deep inside a
// verification call.
//
// SAFETY GUARANTEES:
// - Explicit error propagation (no panics)
// - All byte-level constructors validate lengths
// - Verification failures are typed errors, never silent

use serde::{Serialize, Deserialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

/// SPHINCS+-SHA2-128f-simple parameter sizes.
pub const SPHINCS_PUBLIC_KEY_BYTES: usize = 32;
pub const SPHINCS_SECRET_KEY_BYTES: usize = 64;
pub const SPHINCS_SIGNATURE_BYTES: usize = 17088;

// ==================== ERROR TYPES ====================

/// Error type for cryptographic operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid key format
    InvalidKeyFormat(String),

    /// Invalid signature format
    InvalidSignatureFormat(String),

    /// Signature verification failed
    SignatureVerificationFailed(String),
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::InvalidKeyFormat(msg) => write!(f, "Invalid key format: {}", msg),
            CryptoError::InvalidSignatureFormat(msg) => write!(f, "Invalid signature format: {}", msg),
            CryptoError::SignatureVerificationFailed(msg) => write!(f, "Signature verification failed: {}", msg),
        }
    }
}

impl std::error::Error for CryptoError {}

pub type CryptoResult<T> = Result<T, CryptoError>;

// ==================== SPHINCS+ KEYS AND SIGNATURES ====================

/// SPHINCS+ public key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SphincsPublicKey {
    bytes: Vec<u8>,
}

impl SphincsPublicKey {
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() != SPHINCS_PUBLIC_KEY_BYTES {
            return Err(CryptoError::InvalidKeyFormat(
                format!("SPHINCS public key must be {} bytes, got {}", SPHINCS_PUBLIC_KEY_BYTES, bytes.len())
            ));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// SPHINCS+ secret key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SphincsSecretKey {
    bytes: Vec<u8>,
}

impl SphincsSecretKey {
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() != SPHINCS_SECRET_KEY_BYTES {
            return Err(CryptoError::InvalidKeyFormat(
                format!("SPHINCS secret key must be {} bytes, got {}", SPHINCS_SECRET_KEY_BYTES, bytes.len())
            ));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// SPHINCS+ detached signature
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SphincsSignature {
    bytes: Vec<u8>,
}

impl SphincsSignature {
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() != SPHINCS_SIGNATURE_BYTES {
            return Err(CryptoError::InvalidSignatureFormat(
                format!("SPHINCS signature must be {} bytes, got {}", SPHINCS_SIGNATURE_BYTES, bytes.len())
            ));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// SPHINCS+ signature system
pub struct SphincsSignatureScheme;

impl SphincsSignatureScheme {
    /// Generate a SPHINCS+ keypair
    pub fn keygen() -> CryptoResult<(SphincsPublicKey, SphincsSecretKey)> {
        use pqcrypto_sphincsplus::sphincssha2128fsimple;
        use pqcrypto_traits::sign::{PublicKey, SecretKey};

        let (pk, sk) = sphincssha2128fsimple::keypair();

        let public_key = SphincsPublicKey::from_bytes(pk.as_bytes().to_vec())?;
        let secret_key = SphincsSecretKey::from_bytes(sk.as_bytes().to_vec())?;

        Ok((public_key, secret_key))
    }

    /// Sign a message
    pub fn sign(message: &[u8], secret_key: &SphincsSecretKey) -> CryptoResult<SphincsSignature> {
        use pqcrypto_sphincsplus::sphincssha2128fsimple;
        use pqcrypto_traits::sign::{DetachedSignature, SecretKey};

        let sk = sphincssha2128fsimple::SecretKey::from_bytes(secret_key.as_bytes())
            .map_err(|_| CryptoError::InvalidKeyFormat("Invalid secret key".to_string()))?;

        let sig = sphincssha2128fsimple::detached_sign(message, &sk);

        SphincsSignature::from_bytes(sig.as_bytes().to_vec())
    }

    /// Verify a signature
    pub fn verify(
        message: &[u8],
        signature: &SphincsSignature,
        public_key: &SphincsPublicKey,
    ) -> CryptoResult<()> {
        use pqcrypto_sphincsplus::sphincssha2128fsimple;
        use pqcrypto_traits::sign::{DetachedSignature, PublicKey};

        let pk = sphincssha2128fsimple::PublicKey::from_bytes(public_key.as_bytes())
            .map_err(|_| CryptoError::InvalidKeyFormat("Invalid public key".to_string()))?;

        let sig = sphincssha2128fsimple::DetachedSignature::from_bytes(signature.as_bytes())
            .map_err(|_| CryptoError::InvalidSignatureFormat("Invalid signature bytes".to_string()))?;

        sphincssha2128fsimple::verify_detached_signature(&sig, message, &pk)
            .map_err(|_| CryptoError::SignatureVerificationFailed("Signature does not match message".to_string()))
    }
}

/// A keypair plus the address derived from its public key.
///
/// Convenience owner for parties that both sign and are identified on-chain
/// (transaction senders, block proposers).
#[derive(Debug, Clone)]
pub struct SphincsKeypair {
    pub public: SphincsPublicKey,
    secret: SphincsSecretKey,
}

impl SphincsKeypair {
    /// Generate a fresh keypair.
    pub fn generate() -> CryptoResult<Self> {
        let (public, secret) = SphincsSignatureScheme::keygen()?;
        Ok(Self { public, secret })
    }

    /// Address of this keypair's public key.
    pub fn address(&self) -> String {
        derive_address(&self.public)
    }

    /// Sign a message with the secret half.
    pub fn sign(&self, message: &[u8]) -> CryptoResult<SphincsSignature> {
        SphincsSignatureScheme::sign(message, &self.secret)
    }
}

/// Derive the on-chain address of a public key: the low 20 bytes of its
/// SHA3-256 digest, hex-encoded with a 0x prefix.
pub fn derive_address(public_key: &SphincsPublicKey) -> String {
    let digest = HashFunctions::sha3_256(public_key.as_bytes());
    format!("0x{}", hex::encode(&digest[12..]))
}

// ==================== HASH FUNCTIONS ====================

/// Cryptographic hash functions (deterministic)
pub struct HashFunctions;

impl HashFunctions {
    /// SHA3-256 hash
    pub fn sha3_256(data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha3_256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut output = [0u8; 32];
        output.copy_from_slice(&result);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphincs_sign_and_verify() {
        let (pk, sk) = SphincsSignatureScheme::keygen().unwrap();

        let message = b"phase one block header";
        let sig = SphincsSignatureScheme::sign(message, &sk).unwrap();

        SphincsSignatureScheme::verify(message, &sig, &pk).unwrap();
    }

    #[test]
    fn test_sphincs_verify_fails_on_wrong_message() {
        let (pk, sk) = SphincsSignatureScheme::keygen().unwrap();

        let sig = SphincsSignatureScheme::sign(b"original", &sk).unwrap();

        let result = SphincsSignatureScheme::verify(b"tampered", &sig, &pk);
        assert!(result.is_err());
    }

    #[test]
    fn test_sphincs_verify_fails_on_wrong_key() {
        let (_, sk) = SphincsSignatureScheme::keygen().unwrap();
        let (other_pk, _) = SphincsSignatureScheme::keygen().unwrap();

        let sig = SphincsSignatureScheme::sign(b"message", &sk).unwrap();

        let result = SphincsSignatureScheme::verify(b"message", &sig, &other_pk);
        assert!(result.is_err());
    }

    #[test]
    fn test_key_length_checks() {
        assert!(SphincsPublicKey::from_bytes(vec![0u8; 31]).is_err());
        assert!(SphincsPublicKey::from_bytes(vec![0u8; SPHINCS_PUBLIC_KEY_BYTES]).is_ok());
        assert!(SphincsSecretKey::from_bytes(vec![0u8; 12]).is_err());
        assert!(SphincsSignature::from_bytes(vec![0u8; 100]).is_err());
    }

    #[test]
    fn test_address_derivation_is_stable() {
        let keypair = SphincsKeypair::generate().unwrap();

        let a1 = keypair.address();
        let a2 = derive_address(&keypair.public);

        assert_eq!(a1, a2);
        assert!(a1.starts_with("0x"));
        assert_eq!(a1.len(), 2 + 40);
    }

    #[test]
    fn test_distinct_keys_get_distinct_addresses() {
        let k1 = SphincsKeypair::generate().unwrap();
        let k2 = SphincsKeypair::generate().unwrap();

        assert_ne!(k1.address(), k2.address());
    }

    #[test]
    fn test_sha3_is_deterministic() {
        let h1 = HashFunctions::sha3_256(b"round seed");
        let h2 = HashFunctions::sha3_256(b"round seed");

        assert_eq!(h1, h2);
    }
}
