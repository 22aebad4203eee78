//! Error types for cryptographic operations.
//!
//! Messages describe what failed, never the material involved.

use thiserror::Error;

/// Result alias for this crate.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by key handling, signing and verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Private key could not be parsed.
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    /// Certificate could not be parsed.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// PEM armour was malformed.
    #[error("invalid PEM: {0}")]
    InvalidPem(String),

    /// Signing failed.
    #[error("signing failed")]
    Signing,

    /// Signature did not verify.
    #[error("signature verification failed")]
    Verification,

    /// Algorithm URI is not supported.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}
