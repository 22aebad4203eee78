//! Construction of the SAML role builders from configuration.
//!
//! Everything here runs at startup and on reload. Any failure is fatal for
//! startup and leaves the previous actors in place on reload.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sso_crypto::{Certificate, RsaSigningKey};
use sso_protocol_saml::{
    EntityDescriptor, IdpSettings, NameIdFormat, RequestBuilder, ResponseBuilder, SamlBinding,
    ServiceKind, SpSettings,
};

use crate::config::{IdpConfig, ServerConfig, SpConfig};

/// The enabled roles, built from one configuration snapshot.
#[derive(Debug, Clone)]
pub struct SamlActors {
    /// IdP role, issuing to the configured SP.
    pub idp: Option<ResponseBuilder>,
    /// SP role, logging in against the configured IdP.
    pub sp: Option<RequestBuilder>,
}

impl SamlActors {
    /// Builds the enabled roles.
    ///
    /// # Errors
    ///
    /// Fails on unreadable metadata, unusable certificates or keys, and
    /// incomplete descriptors. Messages never include key material.
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let own_sp = config.sp.as_ref().map(own_sp_descriptor).transpose()?;

        let idp = match &config.idp {
            Some(idp_config) => {
                let idp = own_idp_descriptor(config, idp_config)?;
                let peer_sp = match (&config.sp_metadata_path, &own_sp) {
                    (Some(path), _) => Arc::new(load_metadata(path)?),
                    (None, Some(own_sp)) => Arc::clone(own_sp),
                    (None, None) => anyhow::bail!("IdP role needs SP_METADATA_PATH or a configured SP"),
                };
                let settings = IdpSettings {
                    assertion_validity: config.assertion_validity(),
                    signing_mode: config.signing_mode,
                    ..IdpSettings::default()
                };
                Some(ResponseBuilder::new(Arc::new(idp), peer_sp, settings).context("IdP role")?)
            }
            None => None,
        };

        let sp = match (&config.sp, own_sp) {
            (Some(sp_config), Some(own_sp)) => {
                let certificate = Certificate::from_pem(&sp_config.idp_certificate_pem)
                    .context("SAML_IDP_CERT is not a valid certificate")?;
                let external_idp = EntityDescriptor::identity_provider(&sp_config.idp_issuer)
                    .with_certificate(certificate)
                    .with_endpoint(ServiceKind::SingleSignOn, SamlBinding::HttpRedirect, &sp_config.idp_entrypoint);
                let settings = SpSettings {
                    clock_skew: config.clock_skew(),
                    ..SpSettings::default()
                };
                Some(RequestBuilder::new(own_sp, Arc::new(external_idp), settings).context("SP role")?)
            }
            _ => None,
        };

        Ok(Self { idp, sp })
    }
}

fn own_idp_descriptor(config: &ServerConfig, idp_config: &IdpConfig) -> anyhow::Result<EntityDescriptor> {
    let descriptor = match &config.idp_metadata_path {
        Some(path) => load_metadata(path)?,
        None => EntityDescriptor::identity_provider(&idp_config.entity_id)
            .with_name_id_format(NameIdFormat::Email)
            .with_endpoint(ServiceKind::SingleSignOn, SamlBinding::HttpRedirect, &idp_config.login_url)
            .with_endpoint(ServiceKind::SingleSignOn, SamlBinding::HttpPost, &idp_config.login_url),
    };

    let certificate =
        Certificate::from_pem(&idp_config.certificate_pem).context("MYIDP__CERT is not a valid certificate")?;
    let key = RsaSigningKey::from_pem(&idp_config.private_key_pem)
        .context("MYIDP_PRIVATE_KEY is not a valid RSA key")?;
    descriptor
        .with_certificate(certificate)
        .with_private_key(key)
        .context("IdP signing key")
}

fn own_sp_descriptor(sp_config: &SpConfig) -> anyhow::Result<Arc<EntityDescriptor>> {
    let mut descriptor = EntityDescriptor::service_provider(&sp_config.issuer).with_endpoint(
        ServiceKind::AssertionConsumer,
        SamlBinding::HttpPost,
        &sp_config.acs_url,
    );
    if let Some((key_pem, cert_pem)) = &sp_config.signing_key_pem {
        let certificate = Certificate::from_pem(cert_pem).context("SAML_SP_CERT is not a valid certificate")?;
        let key = RsaSigningKey::from_pem(key_pem).context("SAML_SP_PRIVATE_KEY is not a valid RSA key")?;
        descriptor = descriptor
            .with_certificate(certificate)
            .with_private_key(key)
            .context("SP signing key")?;
    }
    Ok(Arc::new(descriptor))
}

fn load_metadata(path: &Path) -> anyhow::Result<EntityDescriptor> {
    let xml = std::fs::read_to_string(path).with_context(|| format!("reading metadata {}", path.display()))?;
    EntityDescriptor::from_metadata_xml(&xml).with_context(|| format!("parsing metadata {}", path.display()))
}
