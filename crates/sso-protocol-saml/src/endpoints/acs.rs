//! Assertion Consumer Service endpoint (SP side).

use tracing::{debug, warn};

use crate::bindings::{EncodedMessage, SamlMessageType, SamlParams};
use crate::error::{SamlError, SamlResult};
use crate::sp::RequestBuilder;
use crate::types::{Assertion, SamlBinding};

/// An AuthnRequest on its way to the IdP.
#[derive(Debug, Clone)]
pub struct LoginStart {
    /// ID of the issued request, to be remembered for correlation.
    pub request_id: String,
    /// The framed request.
    pub message: EncodedMessage,
}

/// A validated login.
#[derive(Debug, Clone)]
pub struct AcsOutcome {
    /// The assertion from the verified Response.
    pub assertion: Assertion,
    /// `RelayState` posted alongside the Response.
    pub relay_state: Option<String>,
    /// Whether the Response answered a request this SP issued.
    pub solicited: bool,
}

/// Builds and frames a fresh AuthnRequest.
///
/// # Errors
///
/// Returns the encoding or signing error.
pub fn start_login(builder: &RequestBuilder, relay_state: Option<&str>) -> SamlResult<LoginStart> {
    let request = builder.build_authn_request();
    let request_id = request.id.clone();
    let message = builder.encode(request, relay_state)?;
    Ok(LoginStart { request_id, message })
}

/// AuthnRequest ids the SP issued and has not seen answered yet.
pub trait PendingRequestStore {
    /// Returns true if `request_id` is outstanding.
    fn is_pending(&self, request_id: &str) -> bool;

    /// Removes `request_id`, returning true if it was still outstanding.
    fn consume(&self, request_id: &str) -> bool;
}

/// Validates a Response posted to the ACS.
///
/// The Response's `InResponseTo` is looked up in `pending`. Outstanding ids
/// are validated as solicited, everything else in unsolicited mode, where a
/// concrete unknown id fails correlation. An id is consumed only once its
/// Response has passed validation, so a rejected post leaves it in place.
///
/// # Errors
///
/// Returns `Decoding` if the body has no `SAMLResponse`, otherwise the
/// validation error. `CorrelationMismatch` if the id was consumed by a
/// concurrent post in the meantime.
pub fn process_acs(
    builder: &RequestBuilder,
    body: &str,
    pending: &impl PendingRequestStore,
) -> SamlResult<AcsOutcome> {
    let params = SamlParams::from_urlencoded(body);
    let saml_response = params
        .message(SamlMessageType::Response)
        .ok_or_else(|| SamlError::Decoding("missing SAMLResponse parameter".to_string()))?;

    let claimed = RequestBuilder::peek_in_response_to(SamlBinding::HttpPost, saml_response)?;
    let expected = claimed.filter(|id| pending.is_pending(id));
    debug!(expected = expected.as_deref().unwrap_or_default(), "validating ACS post");

    let assertion = builder
        .validate_response(SamlBinding::HttpPost, saml_response, expected.as_deref())
        .inspect_err(|err| {
            warn!(error = %err, kind = ?err.protocol_kind(), "rejected SAML response");
        })?;

    if let Some(id) = &expected {
        if !pending.consume(id) {
            warn!(request_id = %id, "request answered twice");
            return Err(SamlError::CorrelationMismatch {
                expected: id.clone(),
                actual: format!("{id} (already answered)"),
            });
        }
    }

    Ok(AcsOutcome {
        assertion,
        relay_state: params.relay_state,
        solicited: expected.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idp::{IdpSettings, ResponseBuilder};
    use crate::sp::SpSettings;
    use crate::test_support::{idp_descriptor, idp_public_descriptor, sp_descriptor};
    use crate::types::Attribute;
    use chrono::{DateTime, Duration, Utc};
    use parking_lot::Mutex;
    use std::collections::HashSet;

    #[derive(Default)]
    struct Issued(Mutex<HashSet<String>>);

    impl Issued {
        fn with(id: &str) -> Self {
            let issued = Self::default();
            issued.0.lock().insert(id.to_string());
            issued
        }
    }

    impl PendingRequestStore for Issued {
        fn is_pending(&self, request_id: &str) -> bool {
            self.0.lock().contains(request_id)
        }

        fn consume(&self, request_id: &str) -> bool {
            self.0.lock().remove(request_id)
        }
    }

    fn sp() -> RequestBuilder {
        RequestBuilder::new(sp_descriptor(), idp_public_descriptor(), SpSettings::default()).unwrap()
    }

    fn idp() -> ResponseBuilder {
        ResponseBuilder::new(idp_descriptor(), sp_descriptor(), IdpSettings::default()).unwrap()
    }

    fn acs_body(in_response_to: Option<&str>, relay_state: Option<&str>) -> String {
        acs_body_at(Utc::now(), in_response_to, relay_state)
    }

    fn acs_body_at(issued_at: DateTime<Utc>, in_response_to: Option<&str>, relay_state: Option<&str>) -> String {
        let idp = idp();
        let response = idp
            .build_response_at(issued_at, in_response_to, "jon@example.test", vec![Attribute::single("lastName", "Snow")])
            .unwrap();
        let EncodedMessage::Post { saml_message, .. } = idp.encode(response, relay_state).unwrap() else {
            panic!("expected POST framing");
        };
        let mut body = format!("SAMLResponse={}", urlencoding::encode(&saml_message));
        if let Some(relay_state) = relay_state {
            body.push_str(&format!("&RelayState={}", urlencoding::encode(relay_state)));
        }
        body
    }

    #[test]
    fn start_login_redirects_to_idp() {
        let start = start_login(&sp(), Some("/dashboard")).unwrap();
        let EncodedMessage::Redirect { url } = start.message else {
            panic!("expected Redirect framing");
        };
        assert!(url.contains("RelayState=%2Fdashboard"));
        assert!(start.request_id.starts_with('_'));
    }

    #[test]
    fn solicited_post_consumes_pending_id() {
        let start = start_login(&sp(), None).unwrap();
        let body = acs_body(Some(&start.request_id), Some("/dashboard"));

        let pending = Issued::with(&start.request_id);
        let outcome = process_acs(&sp(), &body, &pending).unwrap();

        assert!(!pending.is_pending(&start.request_id));
        assert!(outcome.solicited);
        assert_eq!(outcome.relay_state.as_deref(), Some("/dashboard"));
        assert_eq!(outcome.assertion.subject_name_id(), "jon@example.test");
    }

    #[test]
    fn unknown_request_id_fails_correlation() {
        let body = acs_body(Some("_never_issued"), None);
        let err = process_acs(&sp(), &body, &Issued::default()).unwrap_err();
        assert!(matches!(err, SamlError::CorrelationMismatch { .. }));
    }

    #[test]
    fn rejected_post_keeps_pending_id() {
        let start = start_login(&sp(), None).unwrap();
        let pending = Issued::with(&start.request_id);

        let stale = acs_body_at(Utc::now() - Duration::hours(1), Some(&start.request_id), None);
        let err = process_acs(&sp(), &stale, &pending).unwrap_err();
        assert!(matches!(err, SamlError::ExpiredAssertion));
        assert!(pending.is_pending(&start.request_id));

        let fresh = acs_body(Some(&start.request_id), None);
        let outcome = process_acs(&sp(), &fresh, &pending).unwrap();
        assert!(outcome.solicited);
    }

    #[test]
    fn replayed_response_fails_correlation() {
        let start = start_login(&sp(), None).unwrap();
        let pending = Issued::with(&start.request_id);
        let body = acs_body(Some(&start.request_id), None);

        process_acs(&sp(), &body, &pending).unwrap();
        let err = process_acs(&sp(), &body, &pending).unwrap_err();
        assert!(matches!(err, SamlError::CorrelationMismatch { .. }));
    }

    #[test]
    fn unsolicited_post_is_accepted() {
        let body = acs_body(None, None);
        let outcome = process_acs(&sp(), &body, &Issued::default()).unwrap();
        assert!(!outcome.solicited);
    }

    #[test]
    fn missing_field_is_decoding_error() {
        let err = process_acs(&sp(), "RelayState=x", &Issued::default()).unwrap_err();
        assert!(matches!(err, SamlError::Decoding(_)));
    }
}
