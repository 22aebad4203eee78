//! Service provider role.
//!
//! [`RequestBuilder`] creates AuthnRequests for one configured IdP and
//! validates the Responses it sends back.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::bindings::{BindingCodec, EncodedMessage, SamlMessageType};
use crate::entity::{EntityDescriptor, EntityRole, ServiceKind};
use crate::error::{SamlError, SamlResult};
use crate::signature::{SignatureConfig, XmlSignatureValidator, XmlSigner};
use crate::types::{Assertion, AuthnRequest, NameIdFormat, Response, SamlBinding, UNSOLICITED_IN_RESPONSE_TO};
use crate::xml;

/// Requesting and validation settings.
#[derive(Debug, Clone)]
pub struct SpSettings {
    /// Tolerance applied to both ends of every validity window.
    pub clock_skew: Duration,
    /// Binding used to send AuthnRequests.
    pub request_binding: SamlBinding,
    /// NameID format to request, if any.
    pub name_id_format: Option<NameIdFormat>,
    /// Signature settings for signed AuthnRequests.
    pub signature: SignatureConfig,
}

impl Default for SpSettings {
    fn default() -> Self {
        Self {
            clock_skew: Duration::minutes(2),
            request_binding: SamlBinding::HttpRedirect,
            name_id_format: None,
            signature: SignatureConfig::default(),
        }
    }
}

/// Builds AuthnRequests for, and validates Responses from, one IdP.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    sp: Arc<EntityDescriptor>,
    idp: Arc<EntityDescriptor>,
    settings: SpSettings,
    acs_url: String,
    sso_url: String,
    validator: XmlSignatureValidator,
    signer: Option<XmlSigner>,
}

impl RequestBuilder {
    /// Creates a builder for `sp` talking to `idp`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the roles are wrong, the IdP has no
    /// signing certificate or SSO endpoint for the request binding, or the
    /// SP has no assertion consumer service.
    pub fn new(sp: Arc<EntityDescriptor>, idp: Arc<EntityDescriptor>, settings: SpSettings) -> SamlResult<Self> {
        if sp.role() != EntityRole::ServiceProvider {
            return Err(SamlError::Configuration(format!("{} is not a service provider", sp.entity_id())));
        }
        if idp.role() != EntityRole::IdentityProvider {
            return Err(SamlError::Configuration(format!("{} is not an identity provider", idp.entity_id())));
        }

        let certificate = idp.certificate().cloned().ok_or_else(|| {
            SamlError::Configuration(format!("{}: signing certificate is required", idp.entity_id()))
        })?;
        let sso_url = idp
            .endpoint(ServiceKind::SingleSignOn, settings.request_binding)
            .ok_or_else(|| {
                SamlError::Configuration(format!(
                    "{}: no single sign-on endpoint for {}",
                    idp.entity_id(),
                    settings.request_binding
                ))
            })?
            .to_string();
        let acs_url = sp
            .preferred_endpoint(ServiceKind::AssertionConsumer, SamlBinding::HttpPost)
            .map(|endpoint| endpoint.location.clone())
            .ok_or_else(|| {
                SamlError::Configuration(format!("{}: no assertion consumer service", sp.entity_id()))
            })?;

        Ok(Self {
            signer: sp.signer(settings.signature.clone()),
            validator: XmlSignatureValidator::new(certificate),
            sp,
            idp,
            settings,
            acs_url,
            sso_url,
        })
    }

    /// Returns the service provider descriptor.
    #[must_use]
    pub fn sp(&self) -> &EntityDescriptor {
        &self.sp
    }

    /// Returns the identity provider descriptor.
    #[must_use]
    pub fn idp(&self) -> &EntityDescriptor {
        &self.idp
    }

    /// Returns this SP's ACS URL.
    #[must_use]
    pub fn acs_url(&self) -> &str {
        &self.acs_url
    }

    /// Builds an AuthnRequest issued now.
    #[must_use]
    pub fn build_authn_request(&self) -> AuthnRequest {
        self.build_authn_request_at(Utc::now())
    }

    /// Builds an AuthnRequest issued at `now` with a fresh ID.
    #[must_use]
    pub fn build_authn_request_at(&self, now: DateTime<Utc>) -> AuthnRequest {
        let mut request = AuthnRequest::new_at(self.sp.entity_id(), now)
            .with_destination(self.sso_url.clone())
            .with_acs_url(self.acs_url.clone())
            .with_protocol_binding(SamlBinding::HttpPost)
            .with_binding(self.settings.request_binding);
        if let Some(format) = self.settings.name_id_format {
            request = request.with_name_id_format(format);
        }
        request
    }

    /// Frames `request` for its binding.
    ///
    /// With an SP key pair a Redirect request gets a query signature and a
    /// POST request an enveloped signature.
    ///
    /// # Errors
    ///
    /// Returns `Decoding` if compression fails and `SignatureCreation` if
    /// signing fails.
    pub fn encode(&self, request: AuthnRequest, relay_state: Option<&str>) -> SamlResult<EncodedMessage> {
        let mut xml = request.to_xml();
        if let (SamlBinding::HttpPost, Some(signer)) = (request.binding, &self.signer) {
            xml = signer.sign(&xml, &request.id)?;
        }
        let destination = request.destination.as_deref().unwrap_or(&self.sso_url);

        let encoded = BindingCodec::encode(
            request.binding,
            &xml,
            destination,
            SamlMessageType::Request,
            relay_state,
            self.signer.as_ref(),
        )?;
        info!(request_id = %request.id, binding = %request.binding, "issued AuthnRequest");
        Ok(encoded)
    }

    /// Reads `InResponseTo` from an encoded Response without validating it.
    ///
    /// Used to find the outstanding request the response claims to answer.
    ///
    /// # Errors
    ///
    /// Returns `Decoding` or `XmlParse` for a malformed message.
    pub fn peek_in_response_to(binding: SamlBinding, saml_response: &str) -> SamlResult<Option<String>> {
        let xml = BindingCodec::decode_value(binding, saml_response)?;
        let root = xml::parse(&xml)?;
        Ok(root
            .attr("InResponseTo")
            .filter(|id| *id != UNSOLICITED_IN_RESPONSE_TO)
            .map(String::from))
    }

    /// Validates a Response against the current time.
    ///
    /// # Errors
    ///
    /// See [`RequestBuilder::validate_response_at`].
    pub fn validate_response(
        &self,
        binding: SamlBinding,
        saml_response: &str,
        expected_request_id: Option<&str>,
    ) -> SamlResult<Assertion> {
        self.validate_response_at(Utc::now(), binding, saml_response, expected_request_id)
    }

    /// Validates the `SAMLResponse` field value as of `now` and returns the
    /// assertion.
    ///
    /// Checks run in order: signatures, issuer, status, signed-assertion
    /// requirement, audience, recipient and destination, validity window,
    /// then correlation. `expected_request_id` is `None` for the
    /// unsolicited flow, which accepts a missing `InResponseTo` or the
    /// `"none"` sentinel.
    ///
    /// # Errors
    ///
    /// Returns the `SamlError` variant for the first failed check.
    pub fn validate_response_at(
        &self,
        now: DateTime<Utc>,
        binding: SamlBinding,
        saml_response: &str,
        expected_request_id: Option<&str>,
    ) -> SamlResult<Assertion> {
        let xml = BindingCodec::decode_value(binding, saml_response)?;
        let root = xml::parse(&xml)?;

        let signed_ids = self.validator.verify_document(&root)?;
        let mut response = Response::from_element(&root)?;
        response.signed = signed_ids.contains(&response.id);
        debug!(response_id = %response.id, signed_ids = ?signed_ids, "decoded Response");

        let idp_entity_id = self.idp.entity_id();
        if let Some(issuer) = &response.issuer {
            if issuer != idp_entity_id {
                return Err(SamlError::InvalidRequest(format!("unexpected response issuer {issuer}")));
            }
        }

        response.status.ensure_success()?;

        let mut assertion = response
            .assertion
            .take()
            .ok_or_else(|| SamlError::MissingElement("Assertion".to_string()))?;
        assertion.signed = signed_ids.contains(&assertion.id);
        if assertion.issuer != idp_entity_id {
            return Err(SamlError::InvalidRequest(format!(
                "unexpected assertion issuer {}",
                assertion.issuer
            )));
        }
        if !response.signed && !assertion.signed {
            return Err(SamlError::SignatureInvalid("neither response nor assertion is signed".to_string()));
        }

        let own_entity_id = self.sp.entity_id();
        if !assertion.conditions.audiences.iter().any(|aud| aud == own_entity_id) {
            return Err(SamlError::AudienceMismatch {
                expected: own_entity_id.to_string(),
                actual: assertion.conditions.audiences.join(", "),
            });
        }

        let confirmation = &assertion.subject.confirmation;
        let recipient = confirmation.recipient.as_deref().unwrap_or_default();
        if recipient != self.acs_url {
            return Err(SamlError::RecipientMismatch {
                expected: self.acs_url.clone(),
                actual: recipient.to_string(),
            });
        }
        if let Some(destination) = &response.destination {
            if *destination != self.acs_url {
                return Err(SamlError::RecipientMismatch {
                    expected: self.acs_url.clone(),
                    actual: destination.clone(),
                });
            }
        }

        if assertion.conditions.not_on_or_after.is_none() && confirmation.not_on_or_after.is_none() {
            warn!(assertion_id = %assertion.id, "assertion has no NotOnOrAfter bound");
            return Err(SamlError::ExpiredAssertion);
        }
        let skew = self.settings.clock_skew;
        let confirmation_live = confirmation.not_on_or_after.map_or(true, |noa| now - skew < noa);
        if !assertion.conditions.is_valid_at(now, skew) || !confirmation_live {
            return Err(SamlError::ExpiredAssertion);
        }

        check_correlation(&response, &assertion, expected_request_id)?;

        info!(
            assertion_id = %assertion.id,
            in_response_to = response.in_response_to.as_deref().unwrap_or_default(),
            "validated SAML response"
        );
        debug!(subject = assertion.subject_name_id(), "authenticated subject");
        Ok(assertion)
    }
}

fn check_correlation(response: &Response, assertion: &Assertion, expected: Option<&str>) -> SamlResult<()> {
    let claimed = [
        response.in_response_to.as_deref(),
        assertion.subject.confirmation.in_response_to.as_deref(),
    ];

    for actual in claimed.into_iter().flatten() {
        let matches = match expected {
            Some(expected) => actual == expected,
            None => actual == UNSOLICITED_IN_RESPONSE_TO,
        };
        if !matches {
            return Err(SamlError::CorrelationMismatch {
                expected: expected.unwrap_or(UNSOLICITED_IN_RESPONSE_TO).to_string(),
                actual: actual.to_string(),
            });
        }
    }

    if let (Some(expected), None) = (expected, response.in_response_to.as_deref()) {
        return Err(SamlError::CorrelationMismatch {
            expected: expected.to_string(),
            actual: String::new(),
        });
    }
    Ok(())
}
