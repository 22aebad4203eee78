//! XML Signature validation.
//!
//! Signatures are checked against pinned certificates from configuration;
//! certificates embedded in `ds:KeyInfo` are ignored. Each signature must be
//! an enveloped signature over its parent element, and the referenced `ID`
//! must be unique in the document so a verified element cannot be confused
//! with a wrapped copy.

use base64::Engine;
use sso_crypto::{digest, digests_match, rsa_verify, Certificate, DigestAlgorithm};

use crate::error::{SamlError, SamlResult};
use crate::xml::{Element, NamespaceScope, Node};

use super::{canonicalize, SignatureAlgorithm, ENVELOPED_SIGNATURE, EXCLUSIVE_C14N};

/// Parsed `ds:Signature` contents.
#[derive(Debug, Clone)]
pub struct XmlSignature {
    /// The signature algorithm used.
    pub algorithm: SignatureAlgorithm,
    /// The digest algorithm of the single reference.
    pub digest_algorithm: DigestAlgorithm,
    /// The referenced ID, without the leading `#`.
    pub reference_id: String,
    /// The decoded digest value.
    pub digest_value: Vec<u8>,
    /// The decoded signature value.
    pub signature_value: Vec<u8>,
}

/// XML signature validator.
#[derive(Debug, Clone)]
pub struct XmlSignatureValidator {
    trusted_certificates: Vec<Certificate>,
}

impl XmlSignatureValidator {
    /// Creates a validator trusting a single certificate.
    #[must_use]
    pub fn new(certificate: Certificate) -> Self {
        Self {
            trusted_certificates: vec![certificate],
        }
    }

    /// Adds another trusted certificate (e.g. during key rollover).
    #[must_use]
    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.trusted_certificates.push(certificate);
        self
    }

    /// Verifies every enveloped signature in the document.
    ///
    /// Returns the IDs of the elements whose signatures verified, in
    /// document order. A document without signatures yields an empty list;
    /// callers decide which elements must be covered.
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` if any signature is malformed, references
    /// anything other than its parent, or fails to verify.
    pub fn verify_document(&self, root: &Element) -> SamlResult<Vec<String>> {
        let mut signed_ids = Vec::new();
        collect_signed_ids(root, &mut signed_ids)?;

        for id in &signed_ids {
            let found = root.find_by_id(id);
            let [(element, scope)] = found.as_slice() else {
                return Err(SamlError::SignatureInvalid(format!(
                    "ID {id} is not unique in the document"
                )));
            };
            self.verify_element(element, scope)?;
        }

        Ok(signed_ids)
    }

    /// Verifies the enveloped signature carried by `element`.
    ///
    /// `scope` holds the namespace declarations inherited from ancestors.
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` on any failure.
    pub fn verify_element(&self, element: &Element, scope: &NamespaceScope) -> SamlResult<XmlSignature> {
        let signature_el = single_signature(element)?.ok_or_else(|| {
            SamlError::SignatureInvalid(format!("{} is not signed", element.local_name()))
        })?;
        let signed_info = signature_el
            .child("SignedInfo")
            .ok_or_else(|| invalid("missing SignedInfo"))?;
        let signature = parse_signature(signature_el, signed_info)?;

        if element.attr("ID") != Some(signature.reference_id.as_str()) {
            return Err(invalid("reference does not point at the enveloping element"));
        }

        let mut unsigned = element.clone();
        unsigned
            .children
            .retain(|node| !matches!(node, Node::Element(child) if is_signature(child)));
        let canonical = canonicalize(&unsigned, scope);
        let computed = digest(signature.digest_algorithm, canonical.as_bytes());
        if !digests_match(&computed, &signature.digest_value) {
            return Err(invalid("digest mismatch"));
        }

        let mut signed_info_scope = scope.clone();
        for el in [element, signature_el] {
            signed_info_scope.extend(
                el.namespace_decls()
                    .map(|(prefix, uri)| (prefix.to_string(), uri.to_string())),
            );
        }
        let canonical_signed_info = canonicalize(signed_info, &signed_info_scope);

        self.verify_with_any(
            canonical_signed_info.as_bytes(),
            &signature.signature_value,
            signature.algorithm,
        )?;

        tracing::debug!(reference_id = %signature.reference_id, "signature verified");
        Ok(signature)
    }

    /// Verifies a Redirect binding signature over the raw query octets.
    ///
    /// # Errors
    ///
    /// Returns `SignatureInvalid` for unknown algorithms, bad encoding or a
    /// signature that no trusted certificate verifies.
    pub fn verify_redirect(&self, signed_query: &str, signature_b64: &str, sig_alg: &str) -> SamlResult<()> {
        let algorithm = SignatureAlgorithm::from_uri(sig_alg)?;
        let signature = decode_base64(signature_b64)?;
        self.verify_with_any(signed_query.as_bytes(), &signature, algorithm)
    }

    fn verify_with_any(&self, data: &[u8], signature: &[u8], algorithm: SignatureAlgorithm) -> SamlResult<()> {
        let verified = self
            .trusted_certificates
            .iter()
            .any(|cert| rsa_verify(cert.public_key_der(), data, signature, algorithm).is_ok());

        if verified {
            Ok(())
        } else {
            Err(invalid("no trusted certificate verifies the signature"))
        }
    }
}

fn invalid(reason: &str) -> SamlError {
    SamlError::SignatureInvalid(reason.to_string())
}

fn is_signature(el: &Element) -> bool {
    el.local_name() == "Signature"
}

fn single_signature(element: &Element) -> SamlResult<Option<&Element>> {
    let mut signatures = element.elements().filter(|el| is_signature(el));
    let first = signatures.next();
    if signatures.next().is_some() {
        return Err(invalid("element carries more than one signature"));
    }
    Ok(first)
}

fn collect_signed_ids(el: &Element, ids: &mut Vec<String>) -> SamlResult<()> {
    if single_signature(el)?.is_some() {
        let id = el
            .attr("ID")
            .ok_or_else(|| invalid("signed element has no ID"))?;
        ids.push(id.to_string());
    }
    for child in el.elements().filter(|child| !is_signature(child)) {
        collect_signed_ids(child, ids)?;
    }
    Ok(())
}

fn parse_signature(signature_el: &Element, signed_info: &Element) -> SamlResult<XmlSignature> {
    let c14n = signed_info
        .child("CanonicalizationMethod")
        .and_then(|m| m.attr("Algorithm"));
    if c14n != Some(EXCLUSIVE_C14N) {
        return Err(invalid("unsupported canonicalization method"));
    }

    let algorithm = signed_info
        .child("SignatureMethod")
        .and_then(|m| m.attr("Algorithm"))
        .ok_or_else(|| invalid("missing SignatureMethod"))
        .and_then(|uri| SignatureAlgorithm::from_uri(uri).map_err(SamlError::from))?;

    let mut references = signed_info.children_named("Reference");
    let reference = references
        .next()
        .ok_or_else(|| invalid("missing Reference"))?;
    if references.next().is_some() {
        return Err(invalid("multiple references are not supported"));
    }

    let reference_id = reference
        .attr("URI")
        .and_then(|uri| uri.strip_prefix('#'))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| invalid("reference URI must be a same-document fragment"))?
        .to_string();

    let transforms: Vec<&str> = reference
        .child("Transforms")
        .map(|t| {
            t.children_named("Transform")
                .filter_map(|tr| tr.attr("Algorithm"))
                .collect()
        })
        .unwrap_or_default();
    if !transforms.contains(&ENVELOPED_SIGNATURE)
        || transforms
            .iter()
            .any(|t| *t != ENVELOPED_SIGNATURE && *t != EXCLUSIVE_C14N)
    {
        return Err(invalid("unsupported transform chain"));
    }

    let digest_algorithm = reference
        .child("DigestMethod")
        .and_then(|m| m.attr("Algorithm"))
        .ok_or_else(|| invalid("missing DigestMethod"))
        .and_then(|uri| DigestAlgorithm::from_uri(uri).map_err(SamlError::from))?;

    let digest_value = decode_base64(&reference.child_text("DigestValue").unwrap_or_default())?;
    let signature_value =
        decode_base64(&signature_el.child_text("SignatureValue").unwrap_or_default())?;

    Ok(XmlSignature {
        algorithm,
        digest_algorithm,
        reference_id,
        digest_value,
        signature_value,
    })
}

fn decode_base64(value: &str) -> SamlResult<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(invalid("empty base64 value"));
    }
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|_| invalid("value is not valid base64"))
}
