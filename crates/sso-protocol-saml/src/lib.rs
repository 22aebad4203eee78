//! SAML 2.0 Web Browser SSO for a single IdP and a single SP.
//!
//! This crate implements both ends of the exchange without an external SAML
//! library:
//!
//! - **AuthnRequest creation and parsing** - [`RequestBuilder`] (SP) and
//!   [`ResponseBuilder::parse_authn_request`] (IdP)
//! - **Response and Assertion issuing** - rendered by the [`TemplateEngine`]
//!   and signed with XML-DSig
//! - **Response validation** - signature, issuer, status, audience,
//!   recipient, validity window and request correlation
//! - **POST and Redirect bindings** - [`BindingCodec`]
//! - **Metadata** - read and write `md:EntityDescriptor` documents
//!
//! # Architecture
//!
//! - [`types`] - SAML messages and their XML mapping
//! - [`xml`] - the element tree everything is parsed into
//! - [`signature`] - exclusive C14N, enveloped signing and verification
//! - [`bindings`] - POST and Redirect framing
//! - [`template`] - placeholder templates for outgoing Responses
//! - [`entity`] - configured IdP and SP descriptors
//! - [`idp`] / [`sp`] - the two roles
//! - [`endpoints`] - request processing for any HTTP server
//! - [`store`] - atomically replaceable configuration
//! - [`error`] - error types
//!
//! # Example
//!
//! ```rust,ignore
//! use sso_protocol_saml::{RequestBuilder, SamlBinding, SpSettings};
//!
//! let sp = RequestBuilder::new(sp_descriptor, idp_descriptor, SpSettings::default())?;
//! let request = sp.build_authn_request();
//! let expected = request.id.clone();
//! let redirect = sp.encode(request, None)?;
//! // ... later, at the ACS:
//! let assertion = sp.validate_response(SamlBinding::HttpPost, &saml_response, Some(&expected))?;
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Metadata](https://docs.oasis-open.org/security/saml/v2.0/saml-metadata-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod endpoints;
pub mod entity;
pub mod error;
pub mod idp;
mod metadata;
pub mod signature;
pub mod sp;
pub mod store;
pub mod template;
pub mod types;
pub mod xml;

#[cfg(test)]
mod test_support;

pub use bindings::{BindingCodec, EncodedMessage, SamlMessageType};
pub use entity::{Endpoint, EntityDescriptor, EntityRole, ServiceKind};
pub use error::{ProtocolErrorKind, SamlError, SamlResult};
pub use idp::{IdpSettings, ResponseBuilder};
pub use signature::{SignatureConfig, SigningMode};
pub use sp::{RequestBuilder, SpSettings};
pub use store::ConfigCell;
pub use template::TemplateEngine;
pub use types::*;
