//! X.509 signing certificates.

use std::fmt;

use base64::Engine;
use x509_parser::prelude::{FromDer, X509Certificate};
use x509_parser::public_key::PublicKey;

use crate::error::{CryptoError, CryptoResult};
use crate::pem::pem_to_der;

/// A parsed X.509 certificate carrying an RSA public key.
///
/// Only the DER bytes and the extracted `RSAPublicKey` are kept; validity
/// dates and chains are not evaluated, matching how SAML metadata pins a
/// single signing certificate per peer.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    public_key: Vec<u8>,
}

impl Certificate {
    /// Parses a DER certificate.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCertificate` if the bytes are not a certificate or
    /// the key is not RSA.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|_| CryptoError::InvalidCertificate("not a DER X.509 certificate".to_string()))?;

        let spki = cert.public_key();
        if !matches!(spki.parsed(), Ok(PublicKey::RSA(_))) {
            return Err(CryptoError::InvalidCertificate(
                "certificate key is not RSA".to_string(),
            ));
        }

        Ok(Self {
            der: der.to_vec(),
            public_key: spki.subject_public_key.data.to_vec(),
        })
    }

    /// Parses a PEM certificate, or the bare base64 body found in metadata.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPem` or `InvalidCertificate`.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        Self::from_der(&pem_to_der(pem)?)
    }

    /// Returns the DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Returns the DER `RSAPublicKey` used for verification.
    #[must_use]
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key
    }

    /// Returns the single-line base64 body used in `ds:X509Certificate`.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("der_len", &self.der.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsa::{rsa_verify, RsaAlgorithm, RsaSigningKey};

    const CERT_PEM: &str = include_str!("../testdata/idp-cert.pem");
    const KEY_PEM: &str = include_str!("../testdata/idp-key.pem");
    const OTHER_CERT_PEM: &str = include_str!("../testdata/sp-cert.pem");

    #[test]
    fn parses_pem_certificate() {
        let cert = Certificate::from_pem(CERT_PEM).unwrap();
        assert!(!cert.der().is_empty());
        assert!(!cert.public_key_der().is_empty());
    }

    #[test]
    fn bare_base64_matches_pem() {
        let cert = Certificate::from_pem(CERT_PEM).unwrap();
        let bare = Certificate::from_pem(&cert.to_base64()).unwrap();
        assert_eq!(cert, bare);
    }

    #[test]
    fn certificate_key_verifies_matching_private_key() {
        let cert = Certificate::from_pem(CERT_PEM).unwrap();
        let key = RsaSigningKey::from_pem(KEY_PEM).unwrap();

        let sig = key.sign(b"data", RsaAlgorithm::Rs256).unwrap();
        rsa_verify(cert.public_key_der(), b"data", &sig, RsaAlgorithm::Rs256).unwrap();
    }

    #[test]
    fn other_certificate_does_not_verify() {
        let cert = Certificate::from_pem(OTHER_CERT_PEM).unwrap();
        let key = RsaSigningKey::from_pem(KEY_PEM).unwrap();

        let sig = key.sign(b"data", RsaAlgorithm::Rs256).unwrap();
        assert!(rsa_verify(cert.public_key_der(), b"data", &sig, RsaAlgorithm::Rs256).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Certificate::from_der(b"definitely not der").is_err());
    }

    #[test]
    fn debug_output_is_redacted() {
        let cert = Certificate::from_pem(CERT_PEM).unwrap();
        let debug = format!("{cert:?}");
        assert!(debug.starts_with("Certificate"));
        assert!(!debug.contains(&cert.to_base64()[..16]));
    }
}
