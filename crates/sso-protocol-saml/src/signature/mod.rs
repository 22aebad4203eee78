//! XML Signature support for SAML.
//!
//! Enveloped XML-DSig signatures over a single element referenced by its
//! `ID`, canonicalized with Exclusive C14N. RSA-SHA256 with a SHA-256 digest
//! is the default; RSA-SHA384 and RSA-SHA512 are accepted. SHA-1 is refused
//! in both directions.

mod c14n;
mod signer;
mod validator;

pub use c14n::canonicalize;
pub use signer::*;
pub use validator::*;

pub use sso_crypto::{DigestAlgorithm, RsaAlgorithm as SignatureAlgorithm};

/// Exclusive C14N (without comments) algorithm URI.
pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// Enveloped-signature transform URI.
pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

/// Which element of an issued Response carries the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigningMode {
    /// Sign the `saml:Assertion`.
    #[default]
    Assertion,
    /// Sign the enclosing `samlp:Response`.
    Response,
}

impl SigningMode {
    /// Returns the local name of the element that gets signed.
    #[must_use]
    pub const fn element_name(self) -> &'static str {
        match self {
            Self::Assertion => "Assertion",
            Self::Response => "Response",
        }
    }

    /// Parses `assertion` or `response` (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "assertion" => Some(Self::Assertion),
            "response" => Some(Self::Response),
            _ => None,
        }
    }
}

/// Configuration for signature creation.
#[derive(Debug, Clone)]
pub struct SignatureConfig {
    /// The signature algorithm to use; its digest is used for references.
    pub algorithm: SignatureAlgorithm,
    /// Whether to include the X.509 certificate in `ds:KeyInfo`.
    pub include_certificate: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            algorithm: SignatureAlgorithm::Rs256,
            include_certificate: true,
        }
    }
}

impl SignatureConfig {
    /// Creates a configuration with the given algorithm.
    #[must_use]
    pub fn with_algorithm(algorithm: SignatureAlgorithm) -> Self {
        Self {
            algorithm,
            ..Self::default()
        }
    }
}

#[cfg(test)]
pub(crate) mod test_keys {
    use std::sync::Arc;

    use sso_crypto::{Certificate, RsaSigningKey};

    pub const IDP_KEY: &str = include_str!("../../testdata/idp-key.pem");
    pub const IDP_CERT: &str = include_str!("../../testdata/idp-cert.pem");
    pub const SP_KEY: &str = include_str!("../../testdata/sp-key.pem");
    pub const SP_CERT: &str = include_str!("../../testdata/sp-cert.pem");

    pub fn idp_key() -> Arc<RsaSigningKey> {
        Arc::new(RsaSigningKey::from_pem(IDP_KEY).unwrap())
    }

    pub fn idp_cert() -> Certificate {
        Certificate::from_pem(IDP_CERT).unwrap()
    }

    pub fn sp_key() -> Arc<RsaSigningKey> {
        Arc::new(RsaSigningKey::from_pem(SP_KEY).unwrap())
    }

    pub fn sp_cert() -> Certificate {
        Certificate::from_pem(SP_CERT).unwrap()
    }
}
