//! Identity provider role.
//!
//! [`ResponseBuilder`] parses AuthnRequests from one configured SP and issues
//! signed Responses to it. The exchange moves through typed values:
//! [`AuthnRequest`] (parsed) to [`Response`] (built) to [`EncodedMessage`]
//! (encoded), and `encode` consumes the response so it cannot be sent twice.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sso_crypto::generate_saml_id;
use tracing::{debug, info};

use crate::bindings::{BindingCodec, EncodedMessage, SamlMessageType};
use crate::entity::{EntityDescriptor, EntityRole, ServiceKind};
use crate::error::{SamlError, SamlResult};
use crate::signature::{SignatureConfig, SigningMode, XmlSignatureValidator};
use crate::template::TemplateEngine;
use crate::types::{
    Assertion, Attribute, AuthnContextClass, AuthnRequest, AuthnStatement, Conditions, NameId,
    Response, SamlBinding, Status, Subject, SubjectConfirmation, UNSOLICITED_IN_RESPONSE_TO,
};
use crate::xml;

/// Issuing settings.
#[derive(Debug, Clone)]
pub struct IdpSettings {
    /// Length of the assertion validity window.
    pub assertion_validity: Duration,
    /// Which element carries the signature.
    pub signing_mode: SigningMode,
    /// Signature algorithm settings.
    pub signature: SignatureConfig,
    /// Authentication context reported in the `AuthnStatement`.
    pub authn_context: AuthnContextClass,
}

impl Default for IdpSettings {
    fn default() -> Self {
        Self {
            assertion_validity: Duration::minutes(5),
            signing_mode: SigningMode::Assertion,
            signature: SignatureConfig::default(),
            authn_context: AuthnContextClass::PasswordProtectedTransport,
        }
    }
}

/// Builds Responses for one SP.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    idp: Arc<EntityDescriptor>,
    sp: Arc<EntityDescriptor>,
    settings: IdpSettings,
    engine: TemplateEngine,
    acs_url: String,
    acs_binding: SamlBinding,
}

impl ResponseBuilder {
    /// Creates a builder for `idp` issuing to `sp`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `idp` is not an identity provider with a
    /// private key, if `sp` is not a service provider, or if `sp` has no
    /// usable assertion consumer service.
    pub fn new(idp: Arc<EntityDescriptor>, sp: Arc<EntityDescriptor>, settings: IdpSettings) -> SamlResult<Self> {
        if idp.role() != EntityRole::IdentityProvider {
            return Err(SamlError::Configuration(format!("{} is not an identity provider", idp.entity_id())));
        }
        if sp.role() != EntityRole::ServiceProvider {
            return Err(SamlError::Configuration(format!("{} is not a service provider", sp.entity_id())));
        }
        if settings.assertion_validity <= Duration::zero() {
            return Err(SamlError::Configuration("assertion validity must be positive".to_string()));
        }

        let signer = idp.signer(settings.signature.clone()).ok_or_else(|| {
            SamlError::Configuration(format!("{}: signing key and certificate are required", idp.entity_id()))
        })?;
        let acs = sp
            .preferred_endpoint(ServiceKind::AssertionConsumer, SamlBinding::HttpPost)
            .ok_or_else(|| {
                SamlError::Configuration(format!("{}: no assertion consumer service", sp.entity_id()))
            })?;
        let (acs_url, acs_binding) = (acs.location.clone(), acs.binding);

        Ok(Self {
            engine: TemplateEngine::new(Some(signer), settings.signing_mode),
            idp,
            sp,
            settings,
            acs_url,
            acs_binding,
        })
    }

    /// Returns the identity provider descriptor.
    #[must_use]
    pub fn idp(&self) -> &EntityDescriptor {
        &self.idp
    }

    /// Returns the service provider descriptor.
    #[must_use]
    pub fn sp(&self) -> &EntityDescriptor {
        &self.sp
    }

    /// Returns the ACS URL responses are delivered to.
    #[must_use]
    pub fn acs_url(&self) -> &str {
        &self.acs_url
    }

    /// Decodes and checks an AuthnRequest.
    ///
    /// `raw` is the raw query string (Redirect) or form body (POST). A
    /// Redirect signature is verified over the raw query when the SP has a
    /// certificate, as is an enveloped signature on a POST request.
    ///
    /// # Errors
    ///
    /// Returns `Decoding` for malformed binding data, `InvalidRequest` for a
    /// foreign issuer, an unknown destination or ACS URL, or missing fields,
    /// and `SignatureInvalid` for a bad signature.
    pub fn parse_authn_request(&self, binding: SamlBinding, raw: &str) -> SamlResult<AuthnRequest> {
        let decoded = BindingCodec::decode(binding, SamlMessageType::Request, raw)?;
        let request = AuthnRequest::from_xml(&decoded.xml, binding)?;
        debug!(request_id = %request.id, %binding, "decoded AuthnRequest");

        if request.issuer != self.sp.entity_id() {
            return Err(SamlError::InvalidRequest(format!(
                "issuer {} is not the configured service provider",
                request.issuer
            )));
        }
        if let Some(destination) = &request.destination {
            if !self.idp.has_endpoint_location(ServiceKind::SingleSignOn, destination) {
                return Err(SamlError::InvalidRequest(format!(
                    "destination {destination} is not a single sign-on endpoint of this provider"
                )));
            }
        }
        if let Some(acs) = &request.assertion_consumer_service_url {
            if !self.sp.has_endpoint_location(ServiceKind::AssertionConsumer, acs) {
                return Err(SamlError::InvalidRequest(format!(
                    "assertion consumer service {acs} is not registered for the service provider"
                )));
            }
        }

        if let Some(certificate) = self.sp.certificate() {
            let validator = XmlSignatureValidator::new(certificate.clone());
            match (&decoded.signature, binding) {
                (Some(signature), _) => validator.verify_redirect(
                    &signature.signed_query,
                    &signature.signature,
                    &signature.sig_alg,
                )?,
                (None, SamlBinding::HttpPost) => {
                    validator.verify_document(&xml::parse(&decoded.xml)?)?;
                }
                (None, SamlBinding::HttpRedirect) => {}
            }
        }

        Ok(request)
    }

    /// Builds a Response issued now.
    ///
    /// # Errors
    ///
    /// See [`ResponseBuilder::build_response_at`].
    pub fn build_response(
        &self,
        in_response_to: Option<&str>,
        subject_email: &str,
        attributes: Vec<Attribute>,
    ) -> SamlResult<Response> {
        self.build_response_at(Utc::now(), in_response_to, subject_email, attributes)
    }

    /// Builds a Response issued at `now`.
    ///
    /// `in_response_to` is the originating AuthnRequest ID; `None` builds an
    /// unsolicited response carrying the `"none"` sentinel.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an empty subject.
    pub fn build_response_at(
        &self,
        now: DateTime<Utc>,
        in_response_to: Option<&str>,
        subject_email: &str,
        attributes: Vec<Attribute>,
    ) -> SamlResult<Response> {
        let subject_email = subject_email.trim();
        if subject_email.is_empty() {
            return Err(SamlError::InvalidRequest("subject identifier is empty".to_string()));
        }

        let in_response_to = in_response_to.unwrap_or(UNSOLICITED_IN_RESPONSE_TO).to_string();
        let not_on_or_after = now + self.settings.assertion_validity;

        let mut confirmation = SubjectConfirmation::bearer(self.acs_url.clone(), not_on_or_after);
        confirmation.in_response_to = Some(in_response_to.clone());

        let assertion = Assertion {
            id: generate_saml_id(),
            issue_instant: now,
            issuer: self.idp.entity_id().to_string(),
            subject: Subject {
                name_id: NameId::new(subject_email).with_format(self.idp.preferred_name_id_format()),
                confirmation,
            },
            conditions: Conditions::window(now, self.settings.assertion_validity)
                .with_audience(self.sp.entity_id()),
            authn_statement: Some(
                AuthnStatement::new(now, self.settings.authn_context).with_session_index(generate_saml_id()),
            ),
            attributes,
            signed: false,
        };

        Ok(Response {
            id: generate_saml_id(),
            issue_instant: now,
            issuer: Some(self.idp.entity_id().to_string()),
            in_response_to: Some(in_response_to),
            destination: Some(self.acs_url.clone()),
            status: Status::success(),
            assertion: Some(assertion),
            signed: false,
        })
    }

    /// Renders, signs and frames `response` for the SP's ACS binding.
    ///
    /// # Errors
    ///
    /// Returns `Template` or `SignatureCreation` if rendering fails.
    pub fn encode(&self, response: Response, relay_state: Option<&str>) -> SamlResult<EncodedMessage> {
        let xml = self.engine.render_response(&response)?;
        let destination = response.destination.as_deref().unwrap_or(&self.acs_url);
        let encoded = BindingCodec::encode(
            self.acs_binding,
            &xml,
            destination,
            SamlMessageType::Response,
            relay_state,
            None,
        )?;

        info!(
            response_id = %response.id,
            in_response_to = response.in_response_to.as_deref().unwrap_or_default(),
            sp = self.sp.entity_id(),
            binding = %self.acs_binding,
            "issued SAML response"
        );
        Ok(encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::HttpRedirectBinding;
    use crate::signature::{test_keys, XmlSigner};
    use crate::test_support::{idp_descriptor, sp_descriptor, IDP_SSO_URL, SP_ACS_URL, SP_ENTITY_ID};
    use crate::types::NameIdFormat;

    fn builder() -> ResponseBuilder {
        ResponseBuilder::new(idp_descriptor(), sp_descriptor(), IdpSettings::default()).unwrap()
    }

    fn redirect_request(issuer: &str) -> (AuthnRequest, String) {
        let request = AuthnRequest::new(issuer)
            .with_destination(IDP_SSO_URL)
            .with_acs_url(SP_ACS_URL);
        let url = HttpRedirectBinding::encode_request(&request.to_xml(), IDP_SSO_URL, Some("rs")).unwrap();
        let query = url.split_once('?').unwrap().1.to_string();
        (request, query)
    }

    #[test]
    fn requires_signing_key() {
        let idp = EntityDescriptor::identity_provider("https://idp.example.test/metadata")
            .with_certificate(test_keys::idp_cert());
        let err = ResponseBuilder::new(Arc::new(idp), sp_descriptor(), IdpSettings::default()).unwrap_err();
        assert!(matches!(err, SamlError::Configuration(_)));
    }

    #[test]
    fn requires_acs_endpoint() {
        let sp = EntityDescriptor::service_provider(SP_ENTITY_ID);
        let err = ResponseBuilder::new(idp_descriptor(), Arc::new(sp), IdpSettings::default()).unwrap_err();
        assert!(matches!(err, SamlError::Configuration(_)));
    }

    #[test]
    fn rejects_swapped_roles() {
        let err = ResponseBuilder::new(sp_descriptor(), idp_descriptor(), IdpSettings::default()).unwrap_err();
        assert!(matches!(err, SamlError::Configuration(_)));
    }

    #[test]
    fn parses_request_from_configured_sp() {
        let (request, query) = redirect_request(SP_ENTITY_ID);
        let parsed = builder().parse_authn_request(SamlBinding::HttpRedirect, &query).unwrap();
        assert_eq!(parsed.id, request.id);
        assert_eq!(parsed.binding, SamlBinding::HttpRedirect);
    }

    #[test]
    fn rejects_foreign_issuer() {
        let (_, query) = redirect_request("https://evil.example.test");
        let err = builder().parse_authn_request(SamlBinding::HttpRedirect, &query).unwrap_err();
        assert!(matches!(err, SamlError::InvalidRequest(_)));
    }

    #[test]
    fn rejects_unknown_destination() {
        let request = AuthnRequest::new(SP_ENTITY_ID).with_destination("https://other.example.test/sso");
        let url = HttpRedirectBinding::encode_request(&request.to_xml(), IDP_SSO_URL, None).unwrap();
        let err = builder()
            .parse_authn_request(SamlBinding::HttpRedirect, url.split_once('?').unwrap().1)
            .unwrap_err();
        assert!(matches!(err, SamlError::InvalidRequest(_)));
    }

    #[test]
    fn missing_field_is_decoding_error() {
        let err = builder()
            .parse_authn_request(SamlBinding::HttpPost, "RelayState=x")
            .unwrap_err();
        assert!(matches!(err, SamlError::Decoding(_)));
    }

    #[test]
    fn verifies_redirect_signature_when_sp_has_certificate() {
        let request = AuthnRequest::new(SP_ENTITY_ID).with_destination(IDP_SSO_URL);
        let signer = XmlSigner::new(test_keys::sp_key(), test_keys::sp_cert());
        let url = HttpRedirectBinding::encode(
            &request.to_xml(),
            IDP_SSO_URL,
            Some("state"),
            SamlMessageType::Request,
            Some(&signer),
        )
        .unwrap();
        let query = url.split_once('?').unwrap().1;
        builder().parse_authn_request(SamlBinding::HttpRedirect, query).unwrap();

        let forged = query.replace("RelayState=state", "RelayState=other");
        let err = builder()
            .parse_authn_request(SamlBinding::HttpRedirect, &forged)
            .unwrap_err();
        assert!(matches!(err, SamlError::SignatureInvalid(_)));
    }

    #[test]
    fn builds_solicited_response() {
        let now = Utc::now();
        let response = builder()
            .build_response_at(now, Some("_req1"), "jon@example.test", vec![Attribute::single("firstName", "Jon")])
            .unwrap();

        assert_eq!(response.in_response_to.as_deref(), Some("_req1"));
        assert_eq!(response.destination.as_deref(), Some(SP_ACS_URL));
        let assertion = response.assertion.as_ref().unwrap();
        assert_ne!(assertion.id, response.id);
        assert_eq!(assertion.subject_name_id(), "jon@example.test");
        assert_eq!(assertion.subject.name_id.parsed_format(), NameIdFormat::Email);
        assert_eq!(assertion.conditions.audiences, vec![SP_ENTITY_ID]);
        assert_eq!(assertion.conditions.not_before, Some(now));
        assert_eq!(assertion.conditions.not_on_or_after, Some(now + Duration::minutes(5)));
        assert_eq!(assertion.subject.confirmation.recipient.as_deref(), Some(SP_ACS_URL));
    }

    #[test]
    fn unsolicited_response_uses_sentinel() {
        let response = builder().build_response(None, "jon@example.test", Vec::new()).unwrap();
        assert_eq!(response.in_response_to.as_deref(), Some(UNSOLICITED_IN_RESPONSE_TO));
        assert!(response.is_unsolicited());
    }

    #[test]
    fn empty_subject_is_rejected() {
        let err = builder().build_response(None, "  ", Vec::new()).unwrap_err();
        assert!(matches!(err, SamlError::InvalidRequest(_)));
    }

    #[test]
    fn response_ids_are_fresh() {
        let builder = builder();
        let a = builder.build_response(None, "a@example.test", Vec::new()).unwrap();
        let b = builder.build_response(None, "a@example.test", Vec::new()).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.assertion.unwrap().id, b.assertion.unwrap().id);
    }

    #[test]
    fn encodes_as_post_form_to_acs() {
        let builder = builder();
        let response = builder.build_response(None, "jon@example.test", Vec::new()).unwrap();
        let encoded = builder.encode(response, Some("relay")).unwrap();
        match encoded {
            EncodedMessage::Post { destination, html, .. } => {
                assert_eq!(destination, SP_ACS_URL);
                assert!(html.contains("SAMLResponse"));
                assert!(html.contains(r#"value="relay""#));
            }
            EncodedMessage::Redirect { .. } => panic!("expected POST framing"),
        }
    }
}
