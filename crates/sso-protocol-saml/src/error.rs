//! SAML error types.
//!
//! Binding-level decoding failures, template failures and protocol-level
//! validation failures are distinct variants so callers can tell a malformed
//! message from a well-formed one that must be refused.

use sso_crypto::CryptoError;
use thiserror::Error;

use crate::types::{status_codes, sub_status_codes};

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// Protocol-level failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolErrorKind {
    /// Issuer, destination or required field problem in a request.
    InvalidRequest,
    /// The IdP answered with a non-success status.
    IdpDenied,
    /// Signature missing or not verifiable against the pinned certificate.
    SignatureInvalid,
    /// Outside the assertion validity window.
    ExpiredAssertion,
    /// Audience does not name this SP.
    AudienceMismatch,
    /// Recipient or destination does not name this ACS.
    RecipientMismatch,
    /// `InResponseTo` does not match the outstanding request.
    CorrelationMismatch,
}

/// SAML errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// Malformed binding-level encoding (base64, deflate, missing field).
    #[error("decoding error: {0}")]
    Decoding(String),

    /// A template placeholder had no supplied value.
    #[error("template error: no value for placeholder `{0}`")]
    Template(String),

    /// Request rejected: issuer/destination mismatch or missing fields.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The IdP returned a non-success status.
    #[error("identity provider denied the request: {status_code}")]
    IdpDenied {
        /// Top-level status code URI.
        status_code: String,
        /// Optional `StatusMessage` text.
        message: Option<String>,
    },

    /// Signature missing or invalid.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// Outside the validity window.
    #[error("assertion is outside its validity window")]
    ExpiredAssertion,

    /// Audience mismatch.
    #[error("audience mismatch: expected {expected}, got {actual}")]
    AudienceMismatch {
        /// This SP's entity ID.
        expected: String,
        /// The audience found in the assertion.
        actual: String,
    },

    /// Recipient mismatch.
    #[error("recipient mismatch: expected {expected}, got {actual}")]
    RecipientMismatch {
        /// This SP's ACS URL.
        expected: String,
        /// The recipient or destination found in the message.
        actual: String,
    },

    /// `InResponseTo` mismatch.
    #[error("InResponseTo mismatch: expected {expected}, got {actual}")]
    CorrelationMismatch {
        /// The outstanding request ID, or the unsolicited sentinel.
        expected: String,
        /// The value found in the response.
        actual: String,
    },

    /// XML was not well formed.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Required element or attribute absent.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Binding not supported for this operation.
    #[error("unsupported binding: {0}")]
    UnsupportedBinding(String),

    /// Signing failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// Fatal configuration problem detected at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SamlError {
    /// Returns the protocol subkind, if this is a protocol-level failure.
    #[must_use]
    pub const fn protocol_kind(&self) -> Option<ProtocolErrorKind> {
        match self {
            Self::InvalidRequest(_) => Some(ProtocolErrorKind::InvalidRequest),
            Self::IdpDenied { .. } => Some(ProtocolErrorKind::IdpDenied),
            Self::SignatureInvalid(_) => Some(ProtocolErrorKind::SignatureInvalid),
            Self::ExpiredAssertion => Some(ProtocolErrorKind::ExpiredAssertion),
            Self::AudienceMismatch { .. } => Some(ProtocolErrorKind::AudienceMismatch),
            Self::RecipientMismatch { .. } => Some(ProtocolErrorKind::RecipientMismatch),
            Self::CorrelationMismatch { .. } => Some(ProtocolErrorKind::CorrelationMismatch),
            _ => None,
        }
    }

    /// Returns the SAML status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> &'static str {
        match self {
            Self::Decoding(_)
            | Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::InvalidRequest(_)
            | Self::SignatureInvalid(_)
            | Self::ExpiredAssertion
            | Self::AudienceMismatch { .. }
            | Self::RecipientMismatch { .. }
            | Self::CorrelationMismatch { .. } => status_codes::REQUESTER,
            Self::IdpDenied { .. } => sub_status_codes::AUTHN_FAILED,
            Self::UnsupportedBinding(_) => sub_status_codes::REQUEST_UNSUPPORTED,
            Self::Template(_) | Self::SignatureCreation(_) | Self::Configuration(_) => {
                status_codes::RESPONDER
            }
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Decoding(_)
            | Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::InvalidRequest(_)
            | Self::UnsupportedBinding(_) => 400,
            Self::IdpDenied { .. }
            | Self::SignatureInvalid(_)
            | Self::ExpiredAssertion
            | Self::AudienceMismatch { .. }
            | Self::RecipientMismatch { .. }
            | Self::CorrelationMismatch { .. } => 403,
            Self::Template(_) | Self::SignatureCreation(_) | Self::Configuration(_) => 500,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decoding(format!("invalid base64: {err}"))
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::Decoding(format!("invalid deflate stream: {err}"))
    }
}

impl From<CryptoError> for SamlError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Verification => Self::SignatureInvalid(err.to_string()),
            CryptoError::Signing => Self::SignatureCreation(err.to_string()),
            CryptoError::UnsupportedAlgorithm(_) => Self::SignatureInvalid(err.to_string()),
            CryptoError::InvalidKey(_)
            | CryptoError::InvalidCertificate(_)
            | CryptoError::InvalidPem(_) => Self::Configuration(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        let err = SamlError::InvalidRequest("issuer".to_string());
        assert_eq!(err.status_code(), "urn:oasis:names:tc:SAML:2.0:status:Requester");
        assert_eq!(err.http_status(), 400);

        let err = SamlError::ExpiredAssertion;
        assert_eq!(err.http_status(), 403);

        let err = SamlError::Configuration("no key".to_string());
        assert_eq!(err.status_code(), "urn:oasis:names:tc:SAML:2.0:status:Responder");
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn protocol_kinds() {
        assert_eq!(
            SamlError::SignatureInvalid("digest".into()).protocol_kind(),
            Some(ProtocolErrorKind::SignatureInvalid)
        );
        assert_eq!(
            SamlError::IdpDenied {
                status_code: status_codes::RESPONDER.into(),
                message: None,
            }
            .protocol_kind(),
            Some(ProtocolErrorKind::IdpDenied)
        );
        assert_eq!(SamlError::Decoding("x".into()).protocol_kind(), None);
        assert_eq!(SamlError::Template("NameID".into()).protocol_kind(), None);
    }

    #[test]
    fn crypto_errors_map_by_stage() {
        assert!(matches!(
            SamlError::from(CryptoError::Verification),
            SamlError::SignatureInvalid(_)
        ));
        assert!(matches!(
            SamlError::from(CryptoError::InvalidKey("bad".into())),
            SamlError::Configuration(_)
        ));
    }
}
