//! RSA PKCS#1 v1.5 signatures for XML-DSig and the Redirect binding.

use std::fmt;

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{self, KeyPair, RsaKeyPair, UnparsedPublicKey},
};

use crate::error::{CryptoError, CryptoResult};
use crate::hash::DigestAlgorithm;
use crate::pem::{pem_label, pem_to_der};

/// RSA signature algorithms understood by SAML peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RsaAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-256.
    #[default]
    Rs256,
    /// RSA PKCS#1 v1.5 with SHA-384.
    Rs384,
    /// RSA PKCS#1 v1.5 with SHA-512.
    Rs512,
}

impl RsaAlgorithm {
    /// Returns the XML-DSig algorithm URI, also used as `SigAlg`.
    #[must_use]
    pub const fn xml_dsig_uri(self) -> &'static str {
        match self {
            Self::Rs256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            Self::Rs384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            Self::Rs512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    /// Parses an XML-DSig signature method URI.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedAlgorithm` for RSA-SHA1 and unknown URIs.
    pub fn from_uri(uri: &str) -> CryptoResult<Self> {
        match uri {
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256" => Ok(Self::Rs256),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384" => Ok(Self::Rs384),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512" => Ok(Self::Rs512),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    /// Returns the digest paired with this algorithm in signed references.
    #[must_use]
    pub const fn digest(self) -> DigestAlgorithm {
        match self {
            Self::Rs256 => DigestAlgorithm::Sha256,
            Self::Rs384 => DigestAlgorithm::Sha384,
            Self::Rs512 => DigestAlgorithm::Sha512,
        }
    }
}

/// An RSA private key loaded once and reused for every signature.
pub struct RsaSigningKey {
    key_pair: RsaKeyPair,
}

impl RsaSigningKey {
    /// Loads a key from DER, trying PKCS#1 (`RSAPrivateKey`) then PKCS#8.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` if neither encoding parses.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let key_pair = RsaKeyPair::from_der(der)
            .or_else(|_| RsaKeyPair::from_pkcs8(der))
            .map_err(|_| CryptoError::InvalidKey("not an RSA PKCS#1 or PKCS#8 key".to_string()))?;

        Ok(Self { key_pair })
    }

    /// Loads a key from PEM (`RSA PRIVATE KEY` or `PRIVATE KEY`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidPem` or `InvalidKey`.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        if let Some(label) = pem_label(pem) {
            if label.contains("ENCRYPTED") {
                return Err(CryptoError::InvalidKey(
                    "encrypted private keys are not supported".to_string(),
                ));
            }
        }
        Self::from_der(&pem_to_der(pem)?)
    }

    /// Signs `data` with PKCS#1 v1.5 padding.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if the underlying primitive fails.
    pub fn sign(&self, data: &[u8], algorithm: RsaAlgorithm) -> CryptoResult<Vec<u8>> {
        let padding = match algorithm {
            RsaAlgorithm::Rs256 => &signature::RSA_PKCS1_SHA256,
            RsaAlgorithm::Rs384 => &signature::RSA_PKCS1_SHA384,
            RsaAlgorithm::Rs512 => &signature::RSA_PKCS1_SHA512,
        };

        let rng = SystemRandom::new();
        let mut sig = vec![0u8; self.key_pair.public_modulus_len()];
        self.key_pair
            .sign(padding, &rng, data, &mut sig)
            .map_err(|_| CryptoError::Signing)?;

        Ok(sig)
    }

    /// Returns the public key as a DER `RSAPublicKey`.
    #[must_use]
    pub fn public_key_der(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    /// Returns the modulus length in bits.
    #[must_use]
    pub fn modulus_bits(&self) -> usize {
        self.key_pair.public_modulus_len() * 8
    }
}

impl fmt::Debug for RsaSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSigningKey")
            .field("modulus_bits", &self.modulus_bits())
            .finish_non_exhaustive()
    }
}

/// Verifies an RSA PKCS#1 v1.5 signature.
///
/// `public_key_der` is a DER `RSAPublicKey`, as returned by
/// [`RsaSigningKey::public_key_der`] and [`crate::Certificate::public_key_der`].
///
/// # Errors
///
/// Returns `Verification` if the signature does not match.
pub fn rsa_verify(
    public_key_der: &[u8],
    data: &[u8],
    sig: &[u8],
    algorithm: RsaAlgorithm,
) -> CryptoResult<()> {
    let verification_alg: &'static dyn signature::VerificationAlgorithm = match algorithm {
        RsaAlgorithm::Rs256 => &signature::RSA_PKCS1_2048_8192_SHA256,
        RsaAlgorithm::Rs384 => &signature::RSA_PKCS1_2048_8192_SHA384,
        RsaAlgorithm::Rs512 => &signature::RSA_PKCS1_2048_8192_SHA512,
    };

    UnparsedPublicKey::new(verification_alg, public_key_der)
        .verify(data, sig)
        .map_err(|_| CryptoError::Verification)
}
