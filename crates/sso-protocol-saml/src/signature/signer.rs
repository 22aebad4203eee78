//! XML Signature creation.
//!
//! Produces enveloped signatures: the `ds:Signature` element is inserted as
//! a child of the signed element, directly after its `Issuer`.

use std::sync::Arc;

use base64::Engine;
use sso_crypto::{digest, Certificate, RsaSigningKey};

use crate::error::{SamlError, SamlResult};
use crate::types::XMLDSIG_NS;
use crate::xml::{self, Element, Node};

use super::{canonicalize, SignatureConfig, ENVELOPED_SIGNATURE, EXCLUSIVE_C14N};

/// XML document signer.
///
/// Holds a parsed private key and the matching certificate, which is
/// embedded in `ds:KeyInfo` so peers can check which key signed.
#[derive(Debug, Clone)]
pub struct XmlSigner {
    key: Arc<RsaSigningKey>,
    certificate: Certificate,
    config: SignatureConfig,
}

impl XmlSigner {
    /// Creates a signer with the default configuration (RSA-SHA256).
    #[must_use]
    pub fn new(key: Arc<RsaSigningKey>, certificate: Certificate) -> Self {
        Self {
            key,
            certificate,
            config: SignatureConfig::default(),
        }
    }

    /// Sets the signature configuration.
    #[must_use]
    pub fn with_config(mut self, config: SignatureConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the signature configuration.
    #[must_use]
    pub fn config(&self) -> &SignatureConfig {
        &self.config
    }

    /// Signs the element whose `ID` is `reference_id` and returns the whole
    /// document re-serialized with the signature in place.
    ///
    /// # Errors
    ///
    /// Returns `XmlParse` for malformed input and `SignatureCreation` when the
    /// reference is missing or ambiguous, or the key fails.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let mut root = xml::parse(xml)?;
        self.sign_element(&mut root, reference_id)?;
        Ok(root.to_xml())
    }

    /// Signs the element whose `ID` is `reference_id` inside `root`.
    ///
    /// # Errors
    ///
    /// See [`XmlSigner::sign`].
    pub fn sign_element(&self, root: &mut Element, reference_id: &str) -> SamlResult<()> {
        let signature = {
            let found = root.find_by_id(reference_id);
            let [(target, scope)] = found.as_slice() else {
                return Err(SamlError::SignatureCreation(format!(
                    "expected exactly one element with ID {reference_id}, found {}",
                    found.len()
                )));
            };

            let digest_alg = self.config.algorithm.digest();
            let canonical = canonicalize(target, scope);
            let digest_value = base64::engine::general_purpose::STANDARD
                .encode(digest(digest_alg, canonical.as_bytes()));

            let signed_info = build_signed_info(self, reference_id, &digest_value);

            let mut signed_info_scope = scope.clone();
            signed_info_scope.extend(
                target
                    .namespace_decls()
                    .map(|(prefix, uri)| (prefix.to_string(), uri.to_string())),
            );
            signed_info_scope.push(("ds".to_string(), XMLDSIG_NS.to_string()));
            let canonical_signed_info = canonicalize(&signed_info, &signed_info_scope);

            let signature_value = self
                .key
                .sign(canonical_signed_info.as_bytes(), self.config.algorithm)?;

            build_signature(self, signed_info, &signature_value)
        };

        let target = root.find_by_id_mut(reference_id).ok_or_else(|| {
            SamlError::SignatureCreation(format!("no element with ID {reference_id}"))
        })?;
        let position = target
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(el) if el.local_name() == "Issuer"))
            .map_or(0, |index| index + 1);
        target.children.insert(position, Node::Element(signature));

        tracing::debug!(reference_id, "signed element");
        Ok(())
    }

    /// Signs the Redirect binding octet string
    /// (`SAMLRequest=..&RelayState=..&SigAlg=..`) and returns base64.
    ///
    /// # Errors
    ///
    /// Returns `SignatureCreation` if the key fails.
    pub fn sign_redirect_query(&self, query: &str) -> SamlResult<String> {
        let sig = self.key.sign(query.as_bytes(), self.config.algorithm)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(sig))
    }
}

fn build_signed_info(signer: &XmlSigner, reference_id: &str, digest_value: &str) -> Element {
    let algorithm = signer.config.algorithm;

    Element::new("ds:SignedInfo")
        .with_child(
            Element::new("ds:CanonicalizationMethod").with_attr("Algorithm", EXCLUSIVE_C14N),
        )
        .with_child(
            Element::new("ds:SignatureMethod").with_attr("Algorithm", algorithm.xml_dsig_uri()),
        )
        .with_child(
            Element::new("ds:Reference")
                .with_attr("URI", format!("#{reference_id}"))
                .with_child(
                    Element::new("ds:Transforms")
                        .with_child(
                            Element::new("ds:Transform")
                                .with_attr("Algorithm", ENVELOPED_SIGNATURE),
                        )
                        .with_child(
                            Element::new("ds:Transform").with_attr("Algorithm", EXCLUSIVE_C14N),
                        ),
                )
                .with_child(
                    Element::new("ds:DigestMethod")
                        .with_attr("Algorithm", algorithm.digest().uri()),
                )
                .with_child(Element::new("ds:DigestValue").with_text(digest_value)),
        )
}

fn build_signature(signer: &XmlSigner, signed_info: Element, signature_value: &[u8]) -> Element {
    let mut signature = Element::new("ds:Signature")
        .with_attr("xmlns:ds", XMLDSIG_NS)
        .with_child(signed_info)
        .with_child(
            Element::new("ds:SignatureValue")
                .with_text(base64::engine::general_purpose::STANDARD.encode(signature_value)),
        );

    if signer.config.include_certificate {
        signature = signature.with_child(
            Element::new("ds:KeyInfo").with_child(
                Element::new("ds:X509Data").with_child(
                    Element::new("ds:X509Certificate").with_text(signer.certificate.to_base64()),
                ),
            ),
        );
    }

    signature
}
