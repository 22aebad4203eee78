//! SAML Response types.
//!
//! Response messages sent by an identity provider to a service provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{parse_instant, required_attr, Assertion, Status, UNSOLICITED_IN_RESPONSE_TO};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML Response.
///
/// A response message sent from an identity provider to a service provider
/// containing authentication results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Unique identifier for this response.
    pub id: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the identity provider that issued this response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// The ID of the request this response is for, or `"none"` when
    /// the response is unsolicited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// The URL where this response was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The status of the response.
    pub status: Status,

    /// The embedded assertion, absent on failure responses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion: Option<Assertion>,

    /// Whether the response element itself carried a verified signature.
    #[serde(skip)]
    pub signed: bool,
}

impl Response {
    /// Returns true if this response answers no particular request.
    #[must_use]
    pub fn is_unsolicited(&self) -> bool {
        self.in_response_to
            .as_deref()
            .map_or(true, |id| id == UNSOLICITED_IN_RESPONSE_TO)
    }

    /// Reads a `samlp:Response` element.
    ///
    /// Only a direct `saml:Assertion` child is read. Encrypted assertions
    /// are not supported and more than one assertion is refused.
    ///
    /// # Errors
    ///
    /// Returns `MissingElement` or `XmlParse` on structural problems.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        if element.local_name() != "Response" {
            return Err(SamlError::MissingElement("Response".to_string()));
        }
        if element.child("EncryptedAssertion").is_some() {
            return Err(SamlError::XmlParse("encrypted assertions are not supported".to_string()));
        }

        let mut assertions = element.children_named("Assertion");
        let assertion = assertions.next().map(Assertion::from_element).transpose()?;
        if assertions.next().is_some() {
            return Err(SamlError::XmlParse("response carries more than one assertion".to_string()));
        }

        let status = element
            .child("Status")
            .ok_or_else(|| SamlError::MissingElement("Status".to_string()))?;

        Ok(Self {
            id: required_attr(element, "ID")?.to_string(),
            issue_instant: parse_instant(required_attr(element, "IssueInstant")?, "IssueInstant")?,
            issuer: element.child_text("Issuer").filter(|issuer| !issuer.is_empty()),
            in_response_to: element.attr("InResponseTo").map(String::from),
            destination: element.attr("Destination").map(String::from),
            status: Status::from_element(status)?,
            assertion,
            signed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;

    const FAILED: &str = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp" Version="2.0" IssueInstant="2024-05-01T10:00:00Z" Destination="https://sp.example.test/acs" InResponseTo="_req">
  <saml:Issuer>https://idp.example.test/metadata</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Responder"/></samlp:Status>
</samlp:Response>"#;

    #[test]
    fn parses_failure_response_without_assertion() {
        let response = Response::from_element(&xml::parse(FAILED).unwrap()).unwrap();
        assert_eq!(response.id, "_resp");
        assert_eq!(response.issuer.as_deref(), Some("https://idp.example.test/metadata"));
        assert_eq!(response.in_response_to.as_deref(), Some("_req"));
        assert!(!response.status.is_success());
        assert!(response.assertion.is_none());
        assert!(!response.is_unsolicited());
    }

    #[test]
    fn sentinel_marks_unsolicited() {
        let unsolicited = FAILED.replace(r#"InResponseTo="_req""#, r#"InResponseTo="none""#);
        let response = Response::from_element(&xml::parse(&unsolicited).unwrap()).unwrap();
        assert!(response.is_unsolicited());

        let absent = FAILED.replace(r#" InResponseTo="_req""#, "");
        let response = Response::from_element(&xml::parse(&absent).unwrap()).unwrap();
        assert!(response.is_unsolicited());
    }

    #[test]
    fn rejects_encrypted_assertion() {
        let encrypted = FAILED.replace(
            "</samlp:Response>",
            "<saml:EncryptedAssertion/></samlp:Response>",
        );
        let err = Response::from_element(&xml::parse(&encrypted).unwrap()).unwrap_err();
        assert!(matches!(err, SamlError::XmlParse(_)));
    }

    #[test]
    fn rejects_non_response_root() {
        let err = Response::from_element(&xml::parse("<samlp:AuthnRequest/>").unwrap()).unwrap_err();
        assert!(matches!(err, SamlError::MissingElement(_)));
    }
}
