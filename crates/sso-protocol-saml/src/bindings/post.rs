//! HTTP-POST Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-POST binding for sending SAML messages
//! via HTML form POST.

use base64::Engine;
use quick_xml::escape::escape;

use crate::error::{SamlError, SamlResult};

use super::{missing_field, utf8, DecodedMessage, SamlMessageType, SamlParams, MAX_ENCODED_SIZE_POST};
use crate::types::SamlBinding;

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Encodes a SAML request for HTTP-POST binding.
    ///
    /// Returns an HTML form that will auto-submit to the destination.
    #[must_use]
    pub fn encode_request(xml: &str, destination: &str, relay_state: Option<&str>) -> String {
        Self::encode(xml, destination, relay_state, SamlMessageType::Request)
    }

    /// Encodes a SAML response for HTTP-POST binding.
    ///
    /// Returns an HTML form that will auto-submit to the destination.
    #[must_use]
    pub fn encode_response(xml: &str, destination: &str, relay_state: Option<&str>) -> String {
        Self::encode(xml, destination, relay_state, SamlMessageType::Response)
    }

    /// Encodes a SAML message for HTTP-POST binding.
    #[must_use]
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> String {
        Self::form(&Self::encode_message(xml), destination, relay_state, message_type)
    }

    /// Base64-encodes the message octets.
    #[must_use]
    pub fn encode_message(xml: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(xml)
    }

    /// Renders the auto-submitting form around an already encoded message.
    #[must_use]
    pub fn form(
        encoded: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
    ) -> String {
        let relay_state_input = relay_state
            .map(|rs| {
                format!(
                    r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                    escape(rs)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            escape(destination),
            message_type.form_param(),
            encoded,
            relay_state_input
        )
    }

    /// Decodes a SAML message from HTTP-POST form data.
    ///
    /// # Errors
    ///
    /// Returns `Decoding` if the field for `message_type` is missing,
    /// too large, not base64 or not UTF-8.
    pub fn decode(params: &SamlParams, message_type: SamlMessageType) -> SamlResult<DecodedMessage> {
        let encoded = params.message(message_type).ok_or_else(|| missing_field(message_type))?;

        Ok(DecodedMessage {
            xml: Self::decode_message(encoded)?,
            message_type,
            binding: SamlBinding::HttpPost,
            relay_state: params.relay_state.clone(),
            signature: None,
        })
    }

    /// Base64-decodes a single POST field value.
    ///
    /// # Errors
    ///
    /// Returns `Decoding` on oversize, bad base64 or non UTF-8 content.
    pub fn decode_message(encoded: &str) -> SamlResult<String> {
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if compact.len() > MAX_ENCODED_SIZE_POST {
            return Err(SamlError::Decoding("POST message exceeds size limit".to_string()));
        }
        let decoded = base64::engine::general_purpose::STANDARD.decode(compact)?;
        utf8(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_value<'a>(html: &'a str, name: &str) -> Option<&'a str> {
        let marker = format!(r#"name="{name}" value=""#);
        let start = html.find(&marker)? + marker.len();
        let end = html[start..].find('"')? + start;
        Some(&html[start..end])
    }

    #[test]
    fn encode_response_builds_autosubmit_form() {
        let xml = "<samlp:Response>test</samlp:Response>";
        let html = HttpPostBinding::encode_response(xml, "https://sp.example.com/acs", Some("state123"));

        assert!(html.contains("SAMLResponse"));
        assert!(html.contains("RelayState"));
        assert!(html.contains("state123"));
        assert!(html.contains(r#"action="https://sp.example.com/acs""#));
        assert!(html.contains("document.forms[0].submit()"));
        assert!(html.contains(r#"type="submit""#));
    }

    #[test]
    fn form_field_decodes_back_to_the_message() {
        let xml = r#"<samlp:AuthnRequest ID="_abc">x &amp; y</samlp:AuthnRequest>"#;
        let html = HttpPostBinding::encode_request(xml, "https://idp.example.com/sso", None);
        assert!(!html.contains("RelayState"));

        let params = SamlParams {
            saml_request: field_value(&html, "SAMLRequest").map(String::from),
            ..SamlParams::default()
        };
        let decoded = HttpPostBinding::decode(&params, SamlMessageType::Request).unwrap();
        assert_eq!(decoded.xml, xml);
        assert_eq!(decoded.binding, SamlBinding::HttpPost);
        assert!(decoded.relay_state.is_none());
    }

    #[test]
    fn relay_state_and_destination_are_escaped() {
        let html = HttpPostBinding::encode_response(
            "<x/>",
            "https://sp.example.com/acs?a=1&b=2",
            Some("\"><script>alert(1)</script>"),
        );
        assert!(html.contains("a=1&amp;b=2"));
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&quot;&gt;&lt;script&gt;"));
    }

    #[test]
    fn wrapped_base64_is_accepted() {
        let encoded = HttpPostBinding::encode_message("<samlp:Response ID=\"_1\"/>");
        let wrapped = format!("{}\r\n{}", &encoded[..10], &encoded[10..]);
        assert_eq!(HttpPostBinding::decode_message(&wrapped).unwrap(), "<samlp:Response ID=\"_1\"/>");
    }

    #[test]
    fn rejects_bad_base64() {
        let err = HttpPostBinding::decode_message("!!not base64!!").unwrap_err();
        assert!(matches!(err, SamlError::Decoding(_)));
    }

    #[test]
    fn rejects_oversized_message() {
        let big = "A".repeat(MAX_ENCODED_SIZE_POST + 4);
        let err = HttpPostBinding::decode_message(&big).unwrap_err();
        assert!(matches!(err, SamlError::Decoding(_)));
    }
}
