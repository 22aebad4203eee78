//! # sso-crypto
//!
//! Cryptographic primitives for the SAML SSO actor, built on aws-lc-rs.
//!
//! SAML 2.0 deployments (Azure AD included) still expect RSA PKCS#1 v1.5
//! signatures with SHA-256, so that is the default algorithm here. SHA-384
//! and SHA-512 variants are available for peers that advertise them.
//!
//! Nothing in this crate formats key or certificate bytes into errors or
//! `Debug` output.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod certificate;
pub mod error;
pub mod hash;
pub mod id;
pub mod pem;
pub mod rsa;

pub use certificate::Certificate;
pub use error::{CryptoError, CryptoResult};
pub use hash::{digest, digests_match, sha256, DigestAlgorithm};
pub use id::generate_saml_id;
pub use rsa::{rsa_verify, RsaAlgorithm, RsaSigningKey};
