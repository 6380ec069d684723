use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("invalid signature length: expected {expected}, got {got}")]
    InvalidSignatureLength { expected: usize, got: usize },

    #[error("invalid nonce length: expected {expected}, got {got}")]
    InvalidNonceLength { expected: usize, got: usize },

    #[error("secretbox open failed — authentication tag mismatch or tampering")]
    SecretboxOpen,

    #[error("X25519 shared secret was all-zero (contributory behaviour guard)")]
    ContributoryBehaviour,
}
