//! Entity descriptors.
//!
//! An [`EntityDescriptor`] is the identity of one SAML actor: its entity ID,
//! signing certificate, optional private key, endpoints and preferred NameID
//! formats. Descriptors are built once and never mutated; a reload builds a
//! new descriptor and swaps it in through [`crate::store::ConfigCell`].

use std::sync::Arc;

use sso_crypto::{rsa_verify, Certificate, RsaAlgorithm, RsaSigningKey};

use crate::error::{SamlError, SamlResult};
use crate::signature::{SignatureConfig, XmlSigner};
use crate::types::{NameIdFormat, SamlBinding};

/// Which side of the exchange an entity plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRole {
    /// Identity provider (`IDPSSODescriptor`).
    IdentityProvider,
    /// Service provider (`SPSSODescriptor`).
    ServiceProvider,
}

/// Kind of protocol endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    /// IdP `SingleSignOnService`.
    SingleSignOn,
    /// SP `AssertionConsumerService`.
    AssertionConsumer,
}

impl ServiceKind {
    /// Metadata element name for this endpoint kind.
    #[must_use]
    pub const fn element_name(self) -> &'static str {
        match self {
            Self::SingleSignOn => "SingleSignOnService",
            Self::AssertionConsumer => "AssertionConsumerService",
        }
    }
}

/// A protocol endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Endpoint kind.
    pub kind: ServiceKind,
    /// Binding accepted at the location.
    pub binding: SamlBinding,
    /// Endpoint URL.
    pub location: String,
}

/// Identity of a SAML actor.
#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    entity_id: String,
    role: EntityRole,
    certificate: Option<Certificate>,
    private_key: Option<Arc<RsaSigningKey>>,
    endpoints: Vec<Endpoint>,
    name_id_formats: Vec<NameIdFormat>,
}

impl EntityDescriptor {
    /// Starts an identity provider descriptor.
    #[must_use]
    pub fn identity_provider(entity_id: impl Into<String>) -> Self {
        Self::new(entity_id, EntityRole::IdentityProvider)
    }

    /// Starts a service provider descriptor.
    #[must_use]
    pub fn service_provider(entity_id: impl Into<String>) -> Self {
        Self::new(entity_id, EntityRole::ServiceProvider)
    }

    fn new(entity_id: impl Into<String>, role: EntityRole) -> Self {
        Self {
            entity_id: entity_id.into(),
            role,
            certificate: None,
            private_key: None,
            endpoints: Vec::new(),
            name_id_formats: Vec::new(),
        }
    }

    /// Sets the signing certificate.
    #[must_use]
    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// Attaches the private key matching the signing certificate.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no certificate is set or the key does not
    /// belong to it.
    pub fn with_private_key(mut self, key: RsaSigningKey) -> SamlResult<Self> {
        let certificate = self.certificate.as_ref().ok_or_else(|| {
            SamlError::Configuration(format!("{}: private key given without a certificate", self.entity_id))
        })?;

        let probe = b"key-pair-probe";
        let signature = key.sign(probe, RsaAlgorithm::Rs256)?;
        rsa_verify(certificate.public_key_der(), probe, &signature, RsaAlgorithm::Rs256).map_err(|_| {
            SamlError::Configuration(format!(
                "{}: private key does not match the signing certificate",
                self.entity_id
            ))
        })?;

        self.private_key = Some(Arc::new(key));
        Ok(self)
    }

    /// Adds an endpoint. Earlier endpoints take precedence.
    #[must_use]
    pub fn with_endpoint(mut self, kind: ServiceKind, binding: SamlBinding, location: impl Into<String>) -> Self {
        self.endpoints.push(Endpoint {
            kind,
            binding,
            location: location.into(),
        });
        self
    }

    /// Appends a supported NameID format, in order of preference.
    #[must_use]
    pub fn with_name_id_format(mut self, format: NameIdFormat) -> Self {
        if !self.name_id_formats.contains(&format) {
            self.name_id_formats.push(format);
        }
        self
    }

    /// Returns the entity ID.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Returns the role.
    #[must_use]
    pub const fn role(&self) -> EntityRole {
        self.role
    }

    /// Returns the signing certificate.
    #[must_use]
    pub const fn certificate(&self) -> Option<&Certificate> {
        self.certificate.as_ref()
    }

    /// Returns true if a private key is attached.
    #[must_use]
    pub const fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Returns all endpoints in declaration order.
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Returns the location of the first endpoint of `kind` for `binding`.
    #[must_use]
    pub fn endpoint(&self, kind: ServiceKind, binding: SamlBinding) -> Option<&str> {
        self.endpoints
            .iter()
            .find(|e| e.kind == kind && e.binding == binding)
            .map(|e| e.location.as_str())
    }

    /// Returns the first endpoint of `kind`, preferring `binding`.
    #[must_use]
    pub fn preferred_endpoint(&self, kind: ServiceKind, binding: SamlBinding) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.kind == kind && e.binding == binding)
            .or_else(|| self.endpoints.iter().find(|e| e.kind == kind))
    }

    /// Returns true if `url` is any endpoint location of `kind`.
    #[must_use]
    pub fn has_endpoint_location(&self, kind: ServiceKind, url: &str) -> bool {
        self.endpoints.iter().any(|e| e.kind == kind && e.location == url)
    }

    /// Returns the supported NameID formats in order of preference.
    #[must_use]
    pub fn name_id_formats(&self) -> &[NameIdFormat] {
        &self.name_id_formats
    }

    /// Returns the most preferred NameID format.
    #[must_use]
    pub fn preferred_name_id_format(&self) -> NameIdFormat {
        self.name_id_formats.first().copied().unwrap_or_default()
    }

    /// Builds a signer from the attached key pair.
    #[must_use]
    pub fn signer(&self, config: SignatureConfig) -> Option<XmlSigner> {
        let key = self.private_key.clone()?;
        let certificate = self.certificate.clone()?;
        Some(XmlSigner::new(key, certificate).with_config(config))
    }
}
