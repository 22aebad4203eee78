//! SAML Assertion types.
//!
//! Assertions contain statements about a subject made by an issuer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{parse_instant, required_attr, AuthnContextClass, NameId, CM_BEARER};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML Assertion.
///
/// A package of information that supplies one or more statements made
/// by a SAML authority (the issuer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,

    /// Timestamp when this assertion was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the identity provider that issued this assertion.
    pub issuer: String,

    /// The subject of this assertion.
    pub subject: Subject,

    /// Validity window and audience restriction.
    pub conditions: Conditions,

    /// Authentication statement describing how the subject authenticated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_statement: Option<AuthnStatement>,

    /// Attributes about the subject, in document order.
    #[serde(default)]
    pub attributes: Vec<Attribute>,

    /// Whether this assertion carried its own verified signature.
    #[serde(skip)]
    pub signed: bool,
}

impl Assertion {
    /// Returns the subject's NameID value.
    #[must_use]
    pub fn subject_name_id(&self) -> &str {
        &self.subject.name_id.value
    }

    /// Returns the first attribute with the given name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Reads a `saml:Assertion` element.
    ///
    /// # Errors
    ///
    /// Returns `MissingElement` or `XmlParse` if the element is incomplete.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        if element.local_name() != "Assertion" {
            return Err(SamlError::MissingElement("Assertion".to_string()));
        }

        let issuer = element
            .child_text("Issuer")
            .filter(|issuer| !issuer.is_empty())
            .ok_or_else(|| SamlError::MissingElement("Assertion/Issuer".to_string()))?;
        let subject = element
            .child("Subject")
            .ok_or_else(|| SamlError::MissingElement("Subject".to_string()))?;
        let conditions = element
            .child("Conditions")
            .ok_or_else(|| SamlError::MissingElement("Conditions".to_string()))?;

        let attributes = element
            .child("AttributeStatement")
            .map(|statement| {
                statement
                    .children_named("Attribute")
                    .map(Attribute::from_element)
                    .collect::<SamlResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            id: required_attr(element, "ID")?.to_string(),
            issue_instant: parse_instant(required_attr(element, "IssueInstant")?, "IssueInstant")?,
            issuer,
            subject: Subject::from_element(subject)?,
            conditions: Conditions::from_element(conditions)?,
            authn_statement: element
                .child("AuthnStatement")
                .map(AuthnStatement::from_element)
                .transpose()?,
            attributes,
            signed: false,
        })
    }
}

/// SAML Subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// The name identifier of the subject.
    pub name_id: NameId,

    /// Bearer confirmation.
    pub confirmation: SubjectConfirmation,
}

impl Subject {
    fn from_element(element: &Element) -> SamlResult<Self> {
        let name_id = element
            .child("NameID")
            .ok_or_else(|| SamlError::MissingElement("Subject/NameID".to_string()))?;
        let confirmation = element
            .children_named("SubjectConfirmation")
            .find(|c| c.attr("Method") == Some(CM_BEARER))
            .ok_or_else(|| SamlError::MissingElement("bearer SubjectConfirmation".to_string()))?;
        Ok(Self {
            name_id: NameId::from_element(name_id)?,
            confirmation: SubjectConfirmation::from_element(confirmation)?,
        })
    }
}

/// Subject confirmation (bearer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// Confirmation method URI.
    pub method: String,

    /// The ACS URL the assertion may be delivered to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Time after which the subject can no longer be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// The ID of the request being answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,
}

impl SubjectConfirmation {
    /// Creates a bearer confirmation for `recipient`.
    #[must_use]
    pub fn bearer(recipient: impl Into<String>, not_on_or_after: DateTime<Utc>) -> Self {
        Self {
            method: CM_BEARER.to_string(),
            recipient: Some(recipient.into()),
            not_on_or_after: Some(not_on_or_after),
            in_response_to: None,
        }
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        let data = element.child("SubjectConfirmationData");
        let data_attr = |name: &str| data.and_then(|d| d.attr(name));
        Ok(Self {
            method: element.attr("Method").unwrap_or_default().to_string(),
            recipient: data_attr("Recipient").map(String::from),
            not_on_or_after: data_attr("NotOnOrAfter")
                .map(|value| parse_instant(value, "SubjectConfirmationData/@NotOnOrAfter"))
                .transpose()?,
            in_response_to: data_attr("InResponseTo").map(String::from),
        })
    }
}

/// Conditions under which an assertion is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    /// The earliest time the assertion is valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// The time at which the assertion expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Audience restriction entries.
    #[serde(default)]
    pub audiences: Vec<String>,
}

impl Conditions {
    /// Creates a window starting at `now` lasting `validity`.
    #[must_use]
    pub fn window(now: DateTime<Utc>, validity: Duration) -> Self {
        Self {
            not_before: Some(now),
            not_on_or_after: Some(now + validity),
            audiences: Vec::new(),
        }
    }

    /// Adds an audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    /// Returns true if `now` falls inside the window, widened by `skew`
    /// on both ends.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        let started = self.not_before.map_or(true, |nb| now + skew >= nb);
        let not_expired = self.not_on_or_after.map_or(true, |noa| now - skew < noa);
        started && not_expired
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        let instant = |name: &str| {
            element
                .attr(name)
                .map(|value| parse_instant(value, name))
                .transpose()
        };
        let audiences = element
            .children_named("AudienceRestriction")
            .flat_map(|restriction| restriction.children_named("Audience"))
            .map(Element::text)
            .collect();
        Ok(Self {
            not_before: instant("NotBefore")?,
            not_on_or_after: instant("NotOnOrAfter")?,
            audiences,
        })
    }
}

/// Authentication statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// When the authentication occurred.
    pub authn_instant: DateTime<Utc>,

    /// Session index assigned by the IdP.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,

    /// Authentication context class reference URI.
    pub context_class_ref: String,
}

impl AuthnStatement {
    /// Creates a statement for an authentication at `authn_instant`.
    #[must_use]
    pub fn new(authn_instant: DateTime<Utc>, class: AuthnContextClass) -> Self {
        Self {
            authn_instant,
            session_index: None,
            context_class_ref: class.uri().to_string(),
        }
    }

    /// Sets the session index.
    #[must_use]
    pub fn with_session_index(mut self, index: impl Into<String>) -> Self {
        self.session_index = Some(index.into());
        self
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            authn_instant: parse_instant(required_attr(element, "AuthnInstant")?, "AuthnInstant")?,
            session_index: element.attr("SessionIndex").map(String::from),
            context_class_ref: element
                .descendant("AuthnContextClassRef")
                .map(Element::text)
                .unwrap_or_default(),
        })
    }
}

/// SAML Attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// The attribute name.
    pub name: String,

    /// The name format URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,

    /// The attribute values.
    pub values: Vec<String>,
}

impl Attribute {
    /// Creates a single-valued attribute with the basic name format.
    #[must_use]
    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::multi(name, vec![value.into()])
    }

    /// Creates a multi-valued attribute with the basic name format.
    #[must_use]
    pub fn multi(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            name_format: Some(super::ATTRNAME_FORMAT_BASIC.to_string()),
            values,
        }
    }

    /// Returns the first value.
    #[must_use]
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    fn from_element(element: &Element) -> SamlResult<Self> {
        Ok(Self {
            name: required_attr(element, "Name")?.to_string(),
            name_format: element.attr("NameFormat").map(String::from),
            values: element.children_named("AttributeValue").map(Element::text).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NameIdFormat;
    use crate::xml;

    const ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" ID="_a1" Version="2.0" IssueInstant="2024-05-01T10:00:00.000Z">
  <saml:Issuer>https://idp.example.test/metadata</saml:Issuer>
  <saml:Subject>
    <saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">jon@example.test</saml:NameID>
    <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
      <saml:SubjectConfirmationData NotOnOrAfter="2024-05-01T10:05:00.000Z" Recipient="https://sp.example.test/acs" InResponseTo="_r1"/>
    </saml:SubjectConfirmation>
  </saml:Subject>
  <saml:Conditions NotBefore="2024-05-01T10:00:00.000Z" NotOnOrAfter="2024-05-01T10:05:00.000Z">
    <saml:AudienceRestriction><saml:Audience>https://sp.example.test</saml:Audience></saml:AudienceRestriction>
  </saml:Conditions>
  <saml:AuthnStatement AuthnInstant="2024-05-01T10:00:00.000Z" SessionIndex="_s1">
    <saml:AuthnContext><saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</saml:AuthnContextClassRef></saml:AuthnContext>
  </saml:AuthnStatement>
  <saml:AttributeStatement>
    <saml:Attribute Name="firstName" NameFormat="urn:oasis:names:tc:SAML:2.0:attrname-format:basic"><saml:AttributeValue xsi:type="xs:string">Jon</saml:AttributeValue></saml:Attribute>
    <saml:Attribute Name="groups"><saml:AttributeValue>a</saml:AttributeValue><saml:AttributeValue>b</saml:AttributeValue></saml:Attribute>
  </saml:AttributeStatement>
</saml:Assertion>"#;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn parses_full_assertion() {
        let assertion = Assertion::from_element(&xml::parse(ASSERTION).unwrap()).unwrap();

        assert_eq!(assertion.id, "_a1");
        assert_eq!(assertion.issuer, "https://idp.example.test/metadata");
        assert_eq!(assertion.subject_name_id(), "jon@example.test");
        assert_eq!(assertion.subject.name_id.parsed_format(), NameIdFormat::Email);
        assert_eq!(
            assertion.subject.confirmation.recipient.as_deref(),
            Some("https://sp.example.test/acs")
        );
        assert_eq!(assertion.subject.confirmation.in_response_to.as_deref(), Some("_r1"));
        assert_eq!(assertion.conditions.audiences, vec!["https://sp.example.test"]);
        assert_eq!(
            assertion.authn_statement.as_ref().and_then(|s| s.session_index.as_deref()),
            Some("_s1")
        );
        assert_eq!(assertion.attribute("firstName").and_then(Attribute::first_value), Some("Jon"));
        assert_eq!(assertion.attributes[1].values, vec!["a", "b"]);
        assert!(!assertion.signed);
    }

    #[test]
    fn missing_subject_is_rejected() {
        let without_subject = ASSERTION
            .split("<saml:Subject>")
            .next()
            .map(|head| format!("{head}</saml:Assertion>"))
            .unwrap();
        let err = Assertion::from_element(&xml::parse(&without_subject).unwrap()).unwrap_err();
        assert!(matches!(err, SamlError::MissingElement(_)));
    }

    #[test]
    fn validity_window_with_skew() {
        let conditions = Conditions::window(at("2024-05-01T10:00:00Z"), Duration::minutes(5));
        let skew = Duration::minutes(2);

        assert!(conditions.is_valid_at(at("2024-05-01T10:00:00Z"), skew));
        assert!(conditions.is_valid_at(at("2024-05-01T09:58:30Z"), skew));
        assert!(!conditions.is_valid_at(at("2024-05-01T09:57:00Z"), skew));
        assert!(conditions.is_valid_at(at("2024-05-01T10:06:59Z"), skew));
        assert!(!conditions.is_valid_at(at("2024-05-01T10:07:00Z"), skew));
    }

    #[test]
    fn bad_timestamp_is_a_parse_error() {
        let broken = ASSERTION.replace(
            r#"IssueInstant="2024-05-01T10:00:00.000Z">"#,
            r#"IssueInstant="yesterday">"#,
        );
        let err = Assertion::from_element(&xml::parse(&broken).unwrap()).unwrap_err();
        assert!(matches!(err, SamlError::XmlParse(_)));
    }

    #[test]
    fn serializes_without_verification_flag() {
        let mut assertion = Assertion::from_element(&xml::parse(ASSERTION).unwrap()).unwrap();
        assertion.signed = true;

        let json = serde_json::to_value(&assertion).unwrap();
        assert!(json.get("signed").is_none());
        assert_eq!(json["subject"]["name_id"]["value"], "jon@example.test");
        assert_eq!(json["attributes"][0]["name"], "firstName");

        let back: Assertion = serde_json::from_value(json).unwrap();
        assert!(!back.signed);
        assert_eq!(back.conditions, assertion.conditions);
    }
}
