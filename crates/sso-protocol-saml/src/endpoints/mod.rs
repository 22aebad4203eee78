//! Framework-agnostic endpoint processing.
//!
//! Each function takes the raw pieces of one inbound HTTP request and
//! returns the message to send back, so any HTTP server can host the
//! exchange:
//!
//! - **SSO** ([`process_login`], [`process_unsolicited`]) - IdP side,
//!   receives AuthnRequests and answers with signed Responses
//! - **ACS** ([`start_login`], [`process_acs`]) - SP side, issues
//!   AuthnRequests and consumes Responses
//!
//! # Example
//!
//! ```rust,ignore
//! use sso_protocol_saml::endpoints::{detect_binding, process_login, InboundRequest};
//!
//! let inbound = InboundRequest::get(Some(query));
//! let (binding, raw) = detect_binding(&inbound).ok_or(NO_SAML_REQUEST)?;
//! let message = process_login(&builder, binding, raw, "user@example.com", attributes)?;
//! ```

mod acs;
mod sso;

pub use acs::*;
pub use sso::*;

/// HTTP method of an inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
}

/// The parts of an inbound HTTP request the SAML endpoints read.
///
/// `query` and `body` are kept raw (still URL-encoded) so Redirect
/// signatures can be checked over the exact octets received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    /// Raw `application/x-www-form-urlencoded` body.
    pub body: Option<String>,
}

impl InboundRequest {
    /// A GET request with the given query string.
    pub fn get(query: Option<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            query,
            body: None,
        }
    }

    /// A POST request with the given form body.
    pub fn post(body: Option<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            query: None,
            body,
        }
    }
}
