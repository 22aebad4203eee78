//! SAML 2.0 metadata.
//!
//! Reads and writes `md:EntityDescriptor` documents for a single IdP or SP
//! role. Only what single sign-on needs is modelled: entity ID, signing
//! certificate, SSO/ACS endpoints and NameID formats.

use base64::Engine;
use sso_crypto::{Certificate, CryptoError};

use crate::entity::{EntityDescriptor, EntityRole, ServiceKind};
use crate::error::{SamlError, SamlResult};
use crate::types::{NameIdFormat, SamlBinding, MD_NS, SAMLP_NS, XMLDSIG_NS};
use crate::xml::{self, Element};

impl EntityDescriptor {
    /// Parses a metadata document.
    ///
    /// An `md:EntitiesDescriptor` wrapper is accepted; its first entity is
    /// used. Endpoints with bindings other than POST and Redirect are
    /// skipped, as are NameID formats this crate does not know.
    ///
    /// # Errors
    ///
    /// Returns `XmlParse` or `MissingElement` for malformed metadata and
    /// `Configuration` for an unusable certificate.
    pub fn from_metadata_xml(metadata: &str) -> SamlResult<Self> {
        let root = xml::parse(metadata)?;
        let entity = if root.local_name() == "EntityDescriptor" {
            &root
        } else {
            root.descendant("EntityDescriptor")
                .ok_or_else(|| SamlError::MissingElement("EntityDescriptor".to_string()))?
        };

        let entity_id = entity
            .attr("entityID")
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SamlError::MissingElement("EntityDescriptor/@entityID".to_string()))?;

        let (role_element, mut descriptor) = if let Some(idp) = entity.child("IDPSSODescriptor") {
            (idp, Self::identity_provider(entity_id))
        } else if let Some(sp) = entity.child("SPSSODescriptor") {
            (sp, Self::service_provider(entity_id))
        } else {
            return Err(SamlError::MissingElement(
                "IDPSSODescriptor or SPSSODescriptor".to_string(),
            ));
        };

        if let Some(certificate) = signing_certificate(role_element)? {
            descriptor = descriptor.with_certificate(certificate);
        }

        let kind = match descriptor.role() {
            EntityRole::IdentityProvider => ServiceKind::SingleSignOn,
            EntityRole::ServiceProvider => ServiceKind::AssertionConsumer,
        };
        for endpoint in role_element.children_named(kind.element_name()) {
            let binding = endpoint.attr("Binding").and_then(SamlBinding::from_uri);
            if let (Some(binding), Some(location)) = (binding, endpoint.attr("Location")) {
                descriptor = descriptor.with_endpoint(kind, binding, location);
            }
        }

        for format in role_element.children_named("NameIDFormat") {
            if let Some(format) = NameIdFormat::from_uri(&format.text()) {
                descriptor = descriptor.with_name_id_format(format);
            }
        }

        Ok(descriptor)
    }

    /// Serializes the descriptor as a metadata document.
    #[must_use]
    pub fn to_metadata_xml(&self) -> String {
        let mut role = match self.role() {
            EntityRole::IdentityProvider => Element::new("md:IDPSSODescriptor")
                .with_attr("WantAuthnRequestsSigned", "false")
                .with_attr("protocolSupportEnumeration", SAMLP_NS),
            EntityRole::ServiceProvider => Element::new("md:SPSSODescriptor")
                .with_attr(
                    "AuthnRequestsSigned",
                    if self.has_private_key() { "true" } else { "false" },
                )
                .with_attr("WantAssertionsSigned", "true")
                .with_attr("protocolSupportEnumeration", SAMLP_NS),
        };

        if let Some(certificate) = self.certificate() {
            role = role.with_child(
                Element::new("md:KeyDescriptor").with_attr("use", "signing").with_child(
                    Element::new("ds:KeyInfo").with_attr("xmlns:ds", XMLDSIG_NS).with_child(
                        Element::new("ds:X509Data").with_child(
                            Element::new("ds:X509Certificate").with_text(certificate.to_base64()),
                        ),
                    ),
                ),
            );
        }

        for format in self.name_id_formats() {
            role = role.with_child(Element::new("md:NameIDFormat").with_text(format.uri()));
        }

        let mut index = 0;
        for endpoint in self.endpoints() {
            let mut element = Element::new(format!("md:{}", endpoint.kind.element_name()))
                .with_attr("Binding", endpoint.binding.uri())
                .with_attr("Location", endpoint.location.clone());
            if endpoint.kind == ServiceKind::AssertionConsumer {
                element = element.with_attr("index", index.to_string());
                if index == 0 {
                    element = element.with_attr("isDefault", "true");
                }
                index += 1;
            }
            role = role.with_child(element);
        }

        let entity = Element::new("md:EntityDescriptor")
            .with_attr("xmlns:md", MD_NS)
            .with_attr("entityID", self.entity_id())
            .with_child(role);

        format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", entity.to_xml())
    }
}

fn signing_certificate(role: &Element) -> SamlResult<Option<Certificate>> {
    let Some(key_descriptor) = role
        .children_named("KeyDescriptor")
        .find(|kd| matches!(kd.attr("use"), None | Some("signing")))
    else {
        return Ok(None);
    };
    let Some(encoded) = key_descriptor.descendant("X509Certificate") else {
        return Ok(None);
    };

    let compact: String = encoded.text().chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let der = base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|_| CryptoError::InvalidCertificate("metadata certificate is not base64".to_string()))?;
    Ok(Some(Certificate::from_der(&der)?))
}
