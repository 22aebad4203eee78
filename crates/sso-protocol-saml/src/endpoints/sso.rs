//! Single Sign-On endpoint (IdP side).

use tracing::{info, warn};

use crate::bindings::{EncodedMessage, SamlMessageType, SamlParams};
use crate::error::SamlResult;
use crate::idp::ResponseBuilder;
use crate::types::{Attribute, SamlBinding};

use super::{HttpMethod, InboundRequest};

/// Message returned when a login request carries no `SAMLRequest`.
pub const NO_SAML_REQUEST: &str = "No SAMLRequest found (expected GET query or POST body).";

/// Picks the binding of an inbound login request.
///
/// A GET with `SAMLRequest` in the query is a Redirect request, a POST with
/// `SAMLRequest` in the form body is a POST request. Returns the binding and
/// the raw query or body to decode, or `None` when neither applies.
pub fn detect_binding(request: &InboundRequest) -> Option<(SamlBinding, &str)> {
    let (binding, raw) = match request.method {
        HttpMethod::Get => (SamlBinding::HttpRedirect, request.query.as_deref()?),
        HttpMethod::Post => (SamlBinding::HttpPost, request.body.as_deref()?),
    };
    SamlParams::from_urlencoded(raw)
        .message(SamlMessageType::Request)
        .map(|_| (binding, raw))
}

/// Answers an AuthnRequest with a signed Response for `subject_email`.
///
/// The request's `RelayState` is echoed back unchanged.
///
/// # Errors
///
/// Returns the error of the first failing step: decoding and checking the
/// request, building the Response, or rendering and signing it.
pub fn process_login(
    builder: &ResponseBuilder,
    binding: SamlBinding,
    raw: &str,
    subject_email: &str,
    attributes: Vec<Attribute>,
) -> SamlResult<EncodedMessage> {
    let request = builder.parse_authn_request(binding, raw).inspect_err(|err| {
        warn!(error = %err, kind = ?err.protocol_kind(), %binding, "rejected AuthnRequest");
    })?;
    let relay_state = SamlParams::from_urlencoded(raw).relay_state;

    let response = builder.build_response(Some(&request.id), subject_email, attributes)?;
    info!(request_id = %request.id, sp = %request.issuer, "answering AuthnRequest");
    builder.encode(response, relay_state.as_deref())
}

/// Issues an IdP-initiated Response for `subject_email`.
///
/// # Errors
///
/// Returns `InvalidRequest` for an empty subject, or the rendering error.
pub fn process_unsolicited(
    builder: &ResponseBuilder,
    subject_email: &str,
    attributes: Vec<Attribute>,
    relay_state: Option<&str>,
) -> SamlResult<EncodedMessage> {
    let response = builder.build_response(None, subject_email, attributes)?;
    builder.encode(response, relay_state)
}
