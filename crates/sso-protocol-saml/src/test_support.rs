use std::sync::Arc;

use sso_crypto::RsaSigningKey;

use crate::entity::{EntityDescriptor, ServiceKind};
use crate::signature::test_keys;
use crate::types::{NameIdFormat, SamlBinding};

pub const IDP_ENTITY_ID: &str = "https://idp.example.test/metadata";
pub const IDP_SSO_URL: &str = "https://idp.example.test/saml/login";
pub const SP_ENTITY_ID: &str = "https://sp.example.test";
pub const SP_ACS_URL: &str = "https://sp.example.test/saml/acs";

pub fn idp_descriptor() -> Arc<EntityDescriptor> {
    Arc::new(
        EntityDescriptor::identity_provider(IDP_ENTITY_ID)
            .with_certificate(test_keys::idp_cert())
            .with_private_key(RsaSigningKey::from_pem(test_keys::IDP_KEY).unwrap())
            .unwrap()
            .with_name_id_format(NameIdFormat::Email)
            .with_endpoint(ServiceKind::SingleSignOn, SamlBinding::HttpRedirect, IDP_SSO_URL)
            .with_endpoint(ServiceKind::SingleSignOn, SamlBinding::HttpPost, IDP_SSO_URL),
    )
}

/// The IdP as the SP sees it: certificate only.
pub fn idp_public_descriptor() -> Arc<EntityDescriptor> {
    Arc::new(
        EntityDescriptor::identity_provider(IDP_ENTITY_ID)
            .with_certificate(test_keys::idp_cert())
            .with_endpoint(ServiceKind::SingleSignOn, SamlBinding::HttpRedirect, IDP_SSO_URL),
    )
}

pub fn sp_descriptor() -> Arc<EntityDescriptor> {
    Arc::new(
        EntityDescriptor::service_provider(SP_ENTITY_ID)
            .with_certificate(test_keys::sp_cert())
            .with_endpoint(ServiceKind::AssertionConsumer, SamlBinding::HttpPost, SP_ACS_URL),
    )
}

pub fn sp_signing_descriptor() -> Arc<EntityDescriptor> {
    Arc::new(
        EntityDescriptor::service_provider(SP_ENTITY_ID)
            .with_certificate(test_keys::sp_cert())
            .with_private_key(RsaSigningKey::from_pem(test_keys::SP_KEY).unwrap())
            .unwrap()
            .with_endpoint(ServiceKind::AssertionConsumer, SamlBinding::HttpPost, SP_ACS_URL),
    )
}
