//! SAML bindings implementation.
//!
//! This module implements the SAML 2.0 bindings for message transport:
//!
//! - **HTTP-POST Binding** - Messages are base64-encoded and sent in HTML forms
//! - **HTTP-Redirect Binding** - Messages are deflated, base64-encoded, and URL-encoded
//!
//! [`BindingCodec`] dispatches on [`SamlBinding`] so callers never need to
//! know which framing applies.
//!
//! # Usage
//!
//! ```rust,ignore
//! use sso_protocol_saml::bindings::{BindingCodec, SamlMessageType};
//!
//! let html = BindingCodec::encode_post(&xml, "https://sp.example.com/acs", SamlMessageType::Response, Some("state"));
//! let url = BindingCodec::encode_redirect(&xml, "https://idp.example.com/sso", SamlMessageType::Request, None, None)?;
//! ```
//!
//! Redirect URLs longer than what browsers accept are not detected here;
//! keep Redirect for small messages such as AuthnRequests.

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

use serde::Deserialize;

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::SamlBinding;

/// Largest accepted base64 payload for the Redirect binding.
pub const MAX_ENCODED_SIZE_REDIRECT: usize = 128 * 1024;

/// Largest accepted base64 payload for the POST binding.
pub const MAX_ENCODED_SIZE_POST: usize = 512 * 1024;

/// Largest accepted inflated Redirect payload.
pub const MAX_INFLATED_SIZE: usize = 256 * 1024;

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// AuthnRequest message.
    Request,
    /// Response message.
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// Binding parameters from a query string or form body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SamlParams {
    /// SAMLRequest parameter.
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,
    /// SAMLResponse parameter.
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,
    /// RelayState parameter.
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
    /// SigAlg parameter (Redirect binding).
    #[serde(rename = "SigAlg")]
    pub sig_alg: Option<String>,
    /// Signature parameter (Redirect binding).
    #[serde(rename = "Signature")]
    pub signature: Option<String>,
}

impl SamlParams {
    /// Parses an `application/x-www-form-urlencoded` string.
    #[must_use]
    pub fn from_urlencoded(raw: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(raw.trim_start_matches('?').as_bytes()) {
            let slot = match key.as_ref() {
                "SAMLRequest" => &mut params.saml_request,
                "SAMLResponse" => &mut params.saml_response,
                "RelayState" => &mut params.relay_state,
                "SigAlg" => &mut params.sig_alg,
                "Signature" => &mut params.signature,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }

    /// Returns the value for the given message type.
    #[must_use]
    pub fn message(&self, message_type: SamlMessageType) -> Option<&str> {
        match message_type {
            SamlMessageType::Request => self.saml_request.as_deref(),
            SamlMessageType::Response => self.saml_response.as_deref(),
        }
        .filter(|value| !value.trim().is_empty())
    }
}

/// Detached Redirect binding signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSignature {
    /// Signature algorithm URI.
    pub sig_alg: String,
    /// Base64 signature value.
    pub signature: String,
    /// The exact octets that were signed.
    pub signed_query: String,
}

/// Decoded SAML binding message.
#[derive(Debug, Clone)]
pub struct DecodedMessage {
    /// The decoded XML message.
    pub xml: String,
    /// The message type (request or response).
    pub message_type: SamlMessageType,
    /// The binding the message arrived on.
    pub binding: SamlBinding,
    /// The RelayState if present.
    pub relay_state: Option<String>,
    /// Detached signature (Redirect binding only).
    pub signature: Option<RedirectSignature>,
}

/// A message framed for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedMessage {
    /// Auto-submitting HTML form for the POST binding.
    Post {
        /// Form action URL.
        destination: String,
        /// Base64 message, as placed in the hidden field.
        saml_message: String,
        /// Complete HTML document.
        html: String,
    },
    /// Redirect URL for the Redirect binding.
    Redirect {
        /// Destination with the encoded query appended.
        url: String,
    },
}

impl EncodedMessage {
    /// Returns the binding this message is framed for.
    #[must_use]
    pub const fn binding(&self) -> SamlBinding {
        match self {
            Self::Post { .. } => SamlBinding::HttpPost,
            Self::Redirect { .. } => SamlBinding::HttpRedirect,
        }
    }
}

/// Binding-level encoder and decoder.
pub struct BindingCodec;

impl BindingCodec {
    /// Encodes `xml` as an auto-submitting POST form.
    #[must_use]
    pub fn encode_post(
        xml: &str,
        destination: &str,
        message_type: SamlMessageType,
        relay_state: Option<&str>,
    ) -> String {
        HttpPostBinding::encode(xml, destination, relay_state, message_type)
    }

    /// Encodes `xml` as a Redirect URL, signed when `signer` is given.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or signing fails.
    pub fn encode_redirect(
        xml: &str,
        destination: &str,
        message_type: SamlMessageType,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<String> {
        HttpRedirectBinding::encode(xml, destination, relay_state, message_type, signer)
    }

    /// Encodes `xml` for `binding`.
    ///
    /// # Errors
    ///
    /// See [`BindingCodec::encode_redirect`].
    pub fn encode(
        binding: SamlBinding,
        xml: &str,
        destination: &str,
        message_type: SamlMessageType,
        relay_state: Option<&str>,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<EncodedMessage> {
        match binding {
            SamlBinding::HttpPost => {
                let saml_message = HttpPostBinding::encode_message(xml);
                Ok(EncodedMessage::Post {
                    destination: destination.to_string(),
                    html: HttpPostBinding::form(&saml_message, destination, relay_state, message_type),
                    saml_message,
                })
            }
            SamlBinding::HttpRedirect => Ok(EncodedMessage::Redirect {
                url: Self::encode_redirect(xml, destination, message_type, relay_state, signer)?,
            }),
        }
    }

    /// Decodes a raw form body (POST) or raw query string (Redirect).
    ///
    /// # Errors
    ///
    /// Returns `Decoding` if the expected field is missing or malformed.
    pub fn decode(binding: SamlBinding, message_type: SamlMessageType, raw: &str) -> SamlResult<DecodedMessage> {
        match binding {
            SamlBinding::HttpPost => {
                HttpPostBinding::decode(&SamlParams::from_urlencoded(raw), message_type)
            }
            SamlBinding::HttpRedirect => HttpRedirectBinding::decode_query(raw, message_type),
        }
    }

    /// Decodes a single field value (the contents of `SAMLRequest` or
    /// `SAMLResponse`, already URL-decoded).
    ///
    /// # Errors
    ///
    /// Returns `Decoding` if the value is malformed.
    pub fn decode_value(binding: SamlBinding, value: &str) -> SamlResult<String> {
        match binding {
            SamlBinding::HttpPost => HttpPostBinding::decode_message(value),
            SamlBinding::HttpRedirect => HttpRedirectBinding::decode_message(value),
        }
    }
}

pub(crate) fn missing_field(message_type: SamlMessageType) -> SamlError {
    SamlError::Decoding(format!("missing {} parameter", message_type.form_param()))
}

pub(crate) fn utf8(bytes: Vec<u8>) -> SamlResult<String> {
    String::from_utf8(bytes).map_err(|_| SamlError::Decoding("message is not UTF-8".to_string()))
}
