//! XML templates with placeholder substitution and signing.
//!
//! Templates contain `{Name}` placeholders. Every placeholder must receive a
//! value; a missing one is an error rather than an empty string. Values are
//! either [`TemplateValue::Text`], which is XML-escaped, or
//! [`TemplateValue::Markup`], which is inserted verbatim and must only carry
//! fragments rendered by this module.

use std::collections::HashMap;

use quick_xml::escape::escape;

use crate::error::{SamlError, SamlResult};
use crate::signature::{SigningMode, XmlSigner};
use crate::types::{
    format_instant, Assertion, Attribute, AuthnStatement, Response, ATTRNAME_FORMAT_BASIC,
    CM_BEARER, UNSOLICITED_IN_RESPONSE_TO,
};
use crate::xml;

/// Response envelope.
pub const LOGIN_RESPONSE_TEMPLATE: &str = concat!(
    r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion""#,
    r#" ID="{ID}" Version="2.0" IssueInstant="{IssueInstant}" Destination="{Destination}" InResponseTo="{InResponseTo}">"#,
    r#"<saml:Issuer>{Issuer}</saml:Issuer>{Status}{Assertion}</samlp:Response>"#,
);

/// Assertion with bearer subject confirmation and audience restriction.
pub const ASSERTION_TEMPLATE: &str = concat!(
    r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xs="http://www.w3.org/2001/XMLSchema""#,
    r#" ID="{AssertionID}" Version="2.0" IssueInstant="{IssueInstant}">"#,
    r#"<saml:Issuer>{Issuer}</saml:Issuer>"#,
    r#"<saml:Subject><saml:NameID Format="{NameIDFormat}">{NameID}</saml:NameID>"#,
    r#"<saml:SubjectConfirmation Method="{SubjectConfirmationMethod}">"#,
    r#"<saml:SubjectConfirmationData NotOnOrAfter="{SubjectConfirmationDataNotOnOrAfter}" Recipient="{SubjectRecipient}" InResponseTo="{InResponseTo}"/>"#,
    r#"</saml:SubjectConfirmation></saml:Subject>"#,
    r#"<saml:Conditions NotBefore="{ConditionsNotBefore}" NotOnOrAfter="{ConditionsNotOnOrAfter}">"#,
    r#"<saml:AudienceRestriction><saml:Audience>{Audience}</saml:Audience></saml:AudienceRestriction></saml:Conditions>"#,
    r#"{AuthnStatement}{AttributeStatement}</saml:Assertion>"#,
);

/// Authentication statement.
pub const AUTHN_STATEMENT_TEMPLATE: &str = concat!(
    r#"<saml:AuthnStatement AuthnInstant="{AuthnInstant}" SessionIndex="{SessionIndex}">"#,
    r#"<saml:AuthnContext><saml:AuthnContextClassRef>{AuthnContextClassRef}</saml:AuthnContextClassRef></saml:AuthnContext>"#,
    r#"</saml:AuthnStatement>"#,
);

/// One attribute; `{Values}` holds rendered [`ATTRIBUTE_VALUE_TEMPLATE`]s.
pub const ATTRIBUTE_TEMPLATE: &str =
    r#"<saml:Attribute Name="{Name}" NameFormat="{NameFormat}">{Values}</saml:Attribute>"#;

/// One `xs:string` attribute value.
pub const ATTRIBUTE_VALUE_TEMPLATE: &str =
    r#"<saml:AttributeValue xsi:type="xs:string">{Value}</saml:AttributeValue>"#;

/// A substitution value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    /// Escaped before insertion.
    Text(String),
    /// Inserted as-is.
    Markup(String),
}

/// Placeholder values for one render.
#[derive(Debug, Clone, Default)]
pub struct TemplateValues {
    values: HashMap<String, TemplateValue>,
}

impl TemplateValues {
    /// Creates an empty value set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a text value.
    #[must_use]
    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_string(), TemplateValue::Text(value.into()));
        self
    }

    /// Adds a text value if present; absent values stay missing.
    #[must_use]
    pub fn text_opt(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.text(name, value),
            None => self,
        }
    }

    /// Adds a pre-rendered fragment.
    #[must_use]
    pub fn markup(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_string(), TemplateValue::Markup(value.into()));
        self
    }

    fn get(&self, name: &str) -> Option<&TemplateValue> {
        self.values.get(name)
    }
}

/// Fills templates and applies the enveloped signature.
#[derive(Debug, Clone, Default)]
pub struct TemplateEngine {
    signer: Option<XmlSigner>,
    mode: SigningMode,
}

impl TemplateEngine {
    /// Creates an engine that signs with `signer`, if given.
    #[must_use]
    pub fn new(signer: Option<XmlSigner>, mode: SigningMode) -> Self {
        Self { signer, mode }
    }

    /// Returns the signing mode.
    #[must_use]
    pub const fn mode(&self) -> SigningMode {
        self.mode
    }

    /// Returns true if rendered documents are signed.
    #[must_use]
    pub const fn signs(&self) -> bool {
        self.signer.is_some()
    }

    /// Substitutes `values` into `template`, then signs the element chosen
    /// by the signing mode when a signer is configured.
    ///
    /// With [`SigningMode::Assertion`] and no assertion in the document the
    /// root element is signed instead.
    ///
    /// # Errors
    ///
    /// Returns `Template` for a placeholder without a value, `XmlParse` if
    /// the result is not well formed, and `SignatureCreation` if signing fails.
    pub fn render(&self, template: &str, values: &TemplateValues) -> SamlResult<String> {
        let filled = substitute(template, values)?;
        let Some(signer) = &self.signer else {
            return Ok(filled);
        };

        let mut root = xml::parse(&filled)?;
        let target = if root.local_name() == self.mode.element_name() {
            &root
        } else {
            root.descendant(self.mode.element_name()).unwrap_or(&root)
        };
        let reference_id = target
            .attr("ID")
            .ok_or_else(|| SamlError::SignatureCreation("element to sign has no ID".to_string()))?
            .to_string();

        signer.sign_element(&mut root, &reference_id)?;
        Ok(root.to_xml())
    }

    /// Renders `response` with [`LOGIN_RESPONSE_TEMPLATE`].
    ///
    /// # Errors
    ///
    /// See [`TemplateEngine::render`]. A response without issuer or
    /// destination fails with `Template`.
    pub fn render_response(&self, response: &Response) -> SamlResult<String> {
        let in_response_to = response
            .in_response_to
            .as_deref()
            .unwrap_or(UNSOLICITED_IN_RESPONSE_TO);

        let assertion = response
            .assertion
            .as_ref()
            .map(|assertion| render_assertion(assertion, in_response_to))
            .transpose()?
            .unwrap_or_default();

        let values = TemplateValues::new()
            .text("ID", &response.id)
            .text("IssueInstant", format_instant(response.issue_instant))
            .text_opt("Destination", response.destination.as_deref())
            .text("InResponseTo", in_response_to)
            .text_opt("Issuer", response.issuer.as_deref())
            .markup("Status", response.status.to_element().to_xml())
            .markup("Assertion", assertion);

        self.render(LOGIN_RESPONSE_TEMPLATE, &values)
    }
}

fn render_assertion(assertion: &Assertion, in_response_to: &str) -> SamlResult<String> {
    let confirmation = &assertion.subject.confirmation;
    let conditions = &assertion.conditions;

    let authn_statement = assertion
        .authn_statement
        .as_ref()
        .map(|statement| render_authn_statement(statement, &assertion.id))
        .transpose()?
        .unwrap_or_default();

    let attribute_statement = if assertion.attributes.is_empty() {
        String::new()
    } else {
        let attributes = assertion
            .attributes
            .iter()
            .map(render_attribute)
            .collect::<SamlResult<String>>()?;
        format!("<saml:AttributeStatement>{attributes}</saml:AttributeStatement>")
    };

    let values = TemplateValues::new()
        .text("AssertionID", &assertion.id)
        .text("IssueInstant", format_instant(assertion.issue_instant))
        .text("Issuer", &assertion.issuer)
        .text_opt("NameIDFormat", assertion.subject.name_id.format.as_deref())
        .text("NameID", &assertion.subject.name_id.value)
        .text("SubjectConfirmationMethod", CM_BEARER)
        .text_opt(
            "SubjectConfirmationDataNotOnOrAfter",
            confirmation.not_on_or_after.map(format_instant),
        )
        .text_opt("SubjectRecipient", confirmation.recipient.as_deref())
        .text(
            "InResponseTo",
            confirmation.in_response_to.as_deref().unwrap_or(in_response_to),
        )
        .text_opt("ConditionsNotBefore", conditions.not_before.map(format_instant))
        .text_opt("ConditionsNotOnOrAfter", conditions.not_on_or_after.map(format_instant))
        .text_opt("Audience", conditions.audiences.first())
        .markup("AuthnStatement", authn_statement)
        .markup("AttributeStatement", attribute_statement);

    substitute(ASSERTION_TEMPLATE, &values)
}

fn render_authn_statement(statement: &AuthnStatement, assertion_id: &str) -> SamlResult<String> {
    let values = TemplateValues::new()
        .text("AuthnInstant", format_instant(statement.authn_instant))
        .text(
            "SessionIndex",
            statement.session_index.as_deref().unwrap_or(assertion_id),
        )
        .text("AuthnContextClassRef", &statement.context_class_ref);
    substitute(AUTHN_STATEMENT_TEMPLATE, &values)
}

fn render_attribute(attribute: &Attribute) -> SamlResult<String> {
    let rendered_values = attribute
        .values
        .iter()
        .map(|value| substitute(ATTRIBUTE_VALUE_TEMPLATE, &TemplateValues::new().text("Value", value)))
        .collect::<SamlResult<String>>()?;

    let values = TemplateValues::new()
        .text("Name", &attribute.name)
        .text(
            "NameFormat",
            attribute.name_format.as_deref().unwrap_or(ATTRNAME_FORMAT_BASIC),
        )
        .markup("Values", rendered_values);
    substitute(ATTRIBUTE_TEMPLATE, &values)
}

/// Replaces every `{Name}` placeholder. Braces that do not enclose an
/// identifier are copied through unchanged.
fn substitute(template: &str, values: &TemplateValues) -> SamlResult<String> {
    let mut out = String::with_capacity(template.len() * 2);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let name_len = after
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(after.len());
        let name = &after[..name_len];

        let is_placeholder = !name.is_empty()
            && name.starts_with(|c: char| c.is_ascii_alphabetic())
            && after[name_len..].starts_with('}');
        if !is_placeholder {
            out.push('{');
            rest = after;
            continue;
        }

        match values.get(name) {
            Some(TemplateValue::Text(text)) => out.push_str(&escape(text.as_str())),
            Some(TemplateValue::Markup(markup)) => out.push_str(markup),
            None => return Err(SamlError::Template(name.to_string())),
        }
        rest = &after[name_len + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{test_keys, XmlSignatureValidator};
    use crate::types::{Conditions, NameId, Status, Subject, SubjectConfirmation};
    use chrono::{Duration, TimeZone, Utc};

    fn response() -> Response {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let noa = now + Duration::minutes(5);
        Response {
            id: "_resp1".to_string(),
            issue_instant: now,
            issuer: Some("https://idp.example.test/metadata".to_string()),
            in_response_to: None,
            destination: Some("https://sp.example.test/acs".to_string()),
            status: Status::success(),
            assertion: Some(Assertion {
                id: "_assert1".to_string(),
                issue_instant: now,
                issuer: "https://idp.example.test/metadata".to_string(),
                subject: Subject {
                    name_id: NameId::email("jon<snow>@example.test"),
                    confirmation: SubjectConfirmation::bearer("https://sp.example.test/acs", noa),
                },
                conditions: Conditions::window(now, Duration::minutes(5)).with_audience("https://sp.example.test"),
                authn_statement: None,
                attributes: vec![Attribute::single("firstName", "Jon & Co")],
                signed: false,
            }),
            signed: false,
        }
    }

    #[test]
    fn substitutes_and_escapes_text() {
        let values = TemplateValues::new()
            .text("Name", "a<b>&\"c\"")
            .markup("Inner", "<x/>");
        let out = substitute(r#"<r n="{Name}">{Inner}</r>"#, &values).unwrap();
        assert_eq!(out, r#"<r n="a&lt;b&gt;&amp;&quot;c&quot;"><x/></r>"#);
    }

    #[test]
    fn missing_placeholder_is_an_error() {
        let err = substitute("<r>{Present}{Absent}</r>", &TemplateValues::new().text("Present", "x")).unwrap_err();
        assert!(matches!(err, SamlError::Template(ref name) if name == "Absent"));
    }

    #[test]
    fn non_placeholder_braces_pass_through() {
        let out = substitute("{ not } {1a} {Ok}{", &TemplateValues::new().text("Ok", "y")).unwrap();
        assert_eq!(out, "{ not } {1a} y{");
    }

    #[test]
    fn unsigned_response_parses_back() {
        let engine = TemplateEngine::default();
        let xml = engine.render_response(&response()).unwrap();
        assert!(xml.contains(r#"InResponseTo="none""#));
        assert!(!xml.contains("ds:Signature"));

        let parsed = Response::from_element(&xml::parse(&xml).unwrap()).unwrap();
        let assertion = parsed.assertion.unwrap();
        assert_eq!(assertion.subject_name_id(), "jon<snow>@example.test");
        assert_eq!(assertion.attribute("firstName").unwrap().first_value(), Some("Jon & Co"));
        assert_eq!(
            assertion.attribute("firstName").unwrap().name_format.as_deref(),
            Some(ATTRNAME_FORMAT_BASIC)
        );
        assert_eq!(assertion.conditions.audiences, vec!["https://sp.example.test"]);
        assert_eq!(assertion.subject.confirmation.in_response_to.as_deref(), Some("none"));
    }

    #[test]
    fn response_without_destination_fails() {
        let mut response = response();
        response.destination = None;
        let err = TemplateEngine::default().render_response(&response).unwrap_err();
        assert!(matches!(err, SamlError::Template(ref name) if name == "Destination"));
    }

    #[test]
    fn assertion_mode_signs_assertion_after_issuer() {
        let signer = XmlSigner::new(test_keys::idp_key(), test_keys::idp_cert());
        let engine = TemplateEngine::new(Some(signer), SigningMode::Assertion);
        let xml = engine.render_response(&response()).unwrap();

        let root = xml::parse(&xml).unwrap();
        let assertion = root.child("Assertion").unwrap();
        let names: Vec<_> = assertion.elements().map(|el| el.local_name().to_string()).collect();
        assert_eq!(&names[..3], &["Issuer", "Signature", "Subject"]);
        assert!(root.child("Signature").is_none());

        let verified = XmlSignatureValidator::new(test_keys::idp_cert())
            .verify_document(&root)
            .unwrap();
        assert_eq!(verified, vec!["_assert1".to_string()]);
    }

    #[test]
    fn response_mode_signs_response() {
        let signer = XmlSigner::new(test_keys::idp_key(), test_keys::idp_cert());
        let engine = TemplateEngine::new(Some(signer), SigningMode::Response);
        let xml = engine.render_response(&response()).unwrap();

        let root = xml::parse(&xml).unwrap();
        assert!(root.child("Signature").is_some());
        let verified = XmlSignatureValidator::new(test_keys::idp_cert())
            .verify_document(&root)
            .unwrap();
        assert_eq!(verified, vec!["_resp1".to_string()]);
    }

    #[test]
    fn failure_response_without_assertion_signs_root() {
        let mut response = response();
        response.assertion = None;
        response.status = Status::authn_failed("denied");
        let signer = XmlSigner::new(test_keys::idp_key(), test_keys::idp_cert());
        let xml = TemplateEngine::new(Some(signer), SigningMode::Assertion)
            .render_response(&response)
            .unwrap();
        let root = xml::parse(&xml).unwrap();
        assert!(root.child("Signature").is_some());
    }
}
