//! SAML Name ID types.
//!
//! Name identifiers are used to identify subjects in SAML assertions.

use serde::{Deserialize, Serialize};

use super::NameIdFormat;
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML Name ID.
///
/// Represents the identifier of a subject in a SAML assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The actual identifier value.
    pub value: String,

    /// The format URI of the name identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl NameId {
    /// Creates a new name ID with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
        }
    }

    /// Creates a new email name ID.
    #[must_use]
    pub fn email(email: impl Into<String>) -> Self {
        Self::new(email).with_format(NameIdFormat::Email)
    }

    /// Sets the format for this name ID.
    #[must_use]
    pub fn with_format(mut self, format: NameIdFormat) -> Self {
        self.format = Some(format.uri().to_string());
        self
    }

    /// Returns the parsed name ID format.
    #[must_use]
    pub fn parsed_format(&self) -> NameIdFormat {
        self.format
            .as_deref()
            .and_then(NameIdFormat::from_uri)
            .unwrap_or_default()
    }

    /// Reads a `saml:NameID` element.
    ///
    /// # Errors
    ///
    /// Returns `MissingElement` if the element has no value.
    pub fn from_element(element: &Element) -> SamlResult<Self> {
        let value = element.text();
        if value.is_empty() {
            return Err(SamlError::MissingElement("NameID value".to_string()));
        }
        Ok(Self {
            value,
            format: element.attr("Format").map(String::from),
        })
    }
}

/// Name ID policy for authentication requests.
///
/// Specifies constraints on the name identifier to be returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameIdPolicy {
    /// The requested name ID format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Whether a new identifier should be created for this request.
    #[serde(default)]
    pub allow_create: bool,
}

impl NameIdPolicy {
    /// Creates a policy requesting a specific format.
    #[must_use]
    pub fn with_format(format: NameIdFormat) -> Self {
        Self {
            format: Some(format.uri().to_string()),
            allow_create: false,
        }
    }

    /// Sets whether new identifiers can be created.
    #[must_use]
    pub fn allow_create(mut self, allow: bool) -> Self {
        self.allow_create = allow;
        self
    }

    /// Returns the parsed name ID format.
    #[must_use]
    pub fn parsed_format(&self) -> Option<NameIdFormat> {
        self.format.as_deref().and_then(NameIdFormat::from_uri)
    }

    pub(crate) fn from_element(element: &Element) -> Self {
        Self {
            format: element.attr("Format").map(String::from),
            allow_create: element.attr("AllowCreate") == Some("true"),
        }
    }

    pub(crate) fn to_element(&self) -> Element {
        let mut element = Element::new("samlp:NameIDPolicy");
        if let Some(format) = &self.format {
            element = element.with_attr("Format", format.clone());
        }
        element.with_attr("AllowCreate", if self.allow_create { "true" } else { "false" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml;

    #[test]
    fn name_id_email() {
        let name_id = NameId::email("user@example.com");
        assert_eq!(name_id.value, "user@example.com");
        assert_eq!(name_id.parsed_format(), NameIdFormat::Email);
    }

    #[test]
    fn unknown_format_falls_back_to_unspecified() {
        let mut name_id = NameId::new("abc123");
        name_id.format = Some("urn:example:custom".to_string());
        assert_eq!(name_id.parsed_format(), NameIdFormat::Unspecified);
    }

    #[test]
    fn name_id_from_element() {
        let el = xml::parse(
            r#"<saml:NameID xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress"> a&amp;b@example.com </saml:NameID>"#,
        )
        .unwrap();
        let name_id = NameId::from_element(&el).unwrap();
        assert_eq!(name_id.value, "a&b@example.com");
        assert_eq!(name_id.parsed_format(), NameIdFormat::Email);

        let empty = xml::parse("<NameID/>").unwrap();
        assert!(NameId::from_element(&empty).is_err());
    }

    #[test]
    fn name_id_policy_element() {
        let policy = NameIdPolicy::with_format(NameIdFormat::Email).allow_create(true);
        let parsed = NameIdPolicy::from_element(&policy.to_element());
        assert_eq!(parsed.parsed_format(), Some(NameIdFormat::Email));
        assert!(parsed.allow_create);
    }
}
