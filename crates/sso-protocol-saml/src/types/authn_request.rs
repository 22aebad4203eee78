//! SAML AuthnRequest types.
//!
//! Authentication request message sent by a service provider to an identity provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sso_crypto::generate_saml_id;

use super::{format_instant, parse_instant, NameIdFormat, NameIdPolicy, SamlBinding, SAMLP_NS, SAML_NS};
use crate::error::{SamlError, SamlResult};
use crate::xml::{self, Element};

/// SAML Authentication Request.
///
/// An authentication request message sent from a service provider to an
/// identity provider requesting authentication of a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the service provider issuing the request.
    pub issuer: String,

    /// The IdP endpoint this request is sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The URL where the response should be sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_url: Option<String>,

    /// Binding requested for the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_binding: Option<SamlBinding>,

    /// Name ID policy constraints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id_policy: Option<NameIdPolicy>,

    /// Binding the request travels (or travelled) on.
    pub binding: SamlBinding,
}

impl AuthnRequest {
    /// Creates a new authentication request issued now with a fresh ID.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self::new_at(issuer, Utc::now())
    }

    /// Creates a new authentication request issued at `now`.
    #[must_use]
    pub fn new_at(issuer: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_saml_id(),
            issue_instant: now,
            issuer: issuer.into(),
            destination: None,
            assertion_consumer_service_url: None,
            protocol_binding: None,
            name_id_policy: None,
            binding: SamlBinding::HttpRedirect,
        }
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the protocol binding requested for the response.
    #[must_use]
    pub fn with_protocol_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding);
        self
    }

    /// Sets the transport binding.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.binding = binding;
        self
    }

    /// Requests a name ID format.
    #[must_use]
    pub fn with_name_id_format(mut self, format: NameIdFormat) -> Self {
        self.name_id_policy = Some(NameIdPolicy::with_format(format).allow_create(true));
        self
    }

    /// Returns the requested name ID format, if one was named and is known.
    #[must_use]
    pub fn requested_name_id_format(&self) -> Option<NameIdFormat> {
        self.name_id_policy.as_ref().and_then(NameIdPolicy::parsed_format)
    }

    /// Serializes the request as a `samlp:AuthnRequest` document.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut root = Element::new("samlp:AuthnRequest")
            .with_attr("xmlns:samlp", SAMLP_NS)
            .with_attr("xmlns:saml", SAML_NS)
            .with_attr("ID", self.id.clone())
            .with_attr("Version", "2.0")
            .with_attr("IssueInstant", format_instant(self.issue_instant));
        if let Some(destination) = &self.destination {
            root = root.with_attr("Destination", destination.clone());
        }
        if let Some(binding) = self.protocol_binding {
            root = root.with_attr("ProtocolBinding", binding.uri());
        }
        if let Some(acs) = &self.assertion_consumer_service_url {
            root = root.with_attr("AssertionConsumerServiceURL", acs.clone());
        }

        root = root.with_child(Element::new("saml:Issuer").with_text(self.issuer.clone()));
        if let Some(policy) = &self.name_id_policy {
            root = root.with_child(policy.to_element());
        }
        root.to_xml()
    }

    /// Parses a `samlp:AuthnRequest` document that arrived on `binding`.
    ///
    /// # Errors
    ///
    /// Returns `XmlParse` for malformed XML and `InvalidRequest` when the
    /// root is not an AuthnRequest or a required field is absent.
    pub fn from_xml(xml: &str, binding: SamlBinding) -> SamlResult<Self> {
        let root = xml::parse(xml)?;
        if root.local_name() != "AuthnRequest" {
            return Err(SamlError::InvalidRequest(format!(
                "expected AuthnRequest, found {}",
                root.local_name()
            )));
        }
        if root.attr("Version") != Some("2.0") {
            return Err(SamlError::InvalidRequest("unsupported SAML version".to_string()));
        }

        let required = |name: &str| {
            root.attr(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| SamlError::InvalidRequest(format!("AuthnRequest has no {name}")))
        };
        let issuer = root
            .child_text("Issuer")
            .filter(|issuer| !issuer.is_empty())
            .ok_or_else(|| SamlError::InvalidRequest("AuthnRequest has no Issuer".to_string()))?;

        Ok(Self {
            id: required("ID")?.to_string(),
            issue_instant: parse_instant(required("IssueInstant")?, "IssueInstant")?,
            issuer,
            destination: root.attr("Destination").map(String::from),
            assertion_consumer_service_url: root.attr("AssertionConsumerServiceURL").map(String::from),
            protocol_binding: root.attr("ProtocolBinding").and_then(SamlBinding::from_uri),
            name_id_policy: root.child("NameIDPolicy").map(NameIdPolicy::from_element),
            binding,
        })
    }
}
