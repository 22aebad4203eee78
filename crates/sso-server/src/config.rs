//! Server configuration.
//!
//! Configuration is loaded from environment variables (and an optional
//! `.env` file). The IdP role is enabled by `MYIDP_PRIVATE_KEY`, the SP role
//! by `SAML_SP_ISSUER`; anything missing for an enabled role is fatal.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use sso_protocol_saml::SigningMode;

const DEFAULT_IDP_METADATA_PATH: &str = "metadata/idp-metadata.xml";
const DEFAULT_SP_METADATA_PATH: &str = "metadata/sp-metadata.xml";

/// Settings of the identity provider role.
#[derive(Clone)]
pub struct IdpConfig {
    /// Entity ID used when no IdP metadata file is present.
    pub entity_id: String,
    /// Single sign-on URL used when no IdP metadata file is present.
    pub login_url: String,
    /// Signing certificate, PEM.
    pub certificate_pem: String,
    /// Signing key, PEM.
    pub private_key_pem: String,
}

impl std::fmt::Debug for IdpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdpConfig")
            .field("entity_id", &self.entity_id)
            .field("login_url", &self.login_url)
            .finish_non_exhaustive()
    }
}

/// Settings of the service provider role.
#[derive(Clone)]
pub struct SpConfig {
    /// Own entity ID.
    pub issuer: String,
    /// Own assertion consumer service URL.
    pub acs_url: String,
    /// SSO URL of the external IdP.
    pub idp_entrypoint: String,
    /// Entity ID of the external IdP.
    pub idp_issuer: String,
    /// Signing certificate of the external IdP, PEM.
    pub idp_certificate_pem: String,
    /// Optional key pair for signing AuthnRequests, PEM.
    pub signing_key_pem: Option<(String, String)>,
}

impl std::fmt::Debug for SpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpConfig")
            .field("issuer", &self.issuer)
            .field("acs_url", &self.acs_url)
            .field("idp_entrypoint", &self.idp_entrypoint)
            .field("idp_issuer", &self.idp_issuer)
            .field("signs_requests", &self.signing_key_pem.is_some())
            .finish_non_exhaustive()
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host to bind to.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Base URL for the server (used in generated URLs).
    pub base_url: String,

    /// IdP metadata document to load, if any.
    pub idp_metadata_path: Option<PathBuf>,

    /// Metadata of the SP the IdP issues to, if any.
    pub sp_metadata_path: Option<PathBuf>,

    /// IdP role settings.
    pub idp: Option<IdpConfig>,

    /// SP role settings.
    pub sp: Option<SpConfig>,

    /// Validity window of issued assertions, in seconds.
    pub assertion_validity_secs: u64,

    /// Clock skew tolerated when validating, in seconds.
    pub clock_skew_secs: u64,

    /// Which element the IdP signs.
    pub signing_mode: SigningMode,

    /// Subject used when a login carries no email.
    pub default_subject: String,
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Fails if no role is enabled, if a value of an enabled role is missing
    /// or unparsable, or if a PEM file cannot be read.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parsed_var("PORT", 3000)?;
        let base_url = std::env::var("BASE_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));

        let idp = match pem_var("MYIDP_PRIVATE_KEY")? {
            Some(private_key_pem) => Some(IdpConfig {
                entity_id: std::env::var("MYIDP_ENTITY_ID").unwrap_or_else(|_| format!("{base_url}/metadata")),
                login_url: std::env::var("MYIDP_LOGIN_URL").unwrap_or_else(|_| format!("{base_url}/saml/login")),
                certificate_pem: pem_var("MYIDP__CERT")?
                    .context("MYIDP__CERT is required when MYIDP_PRIVATE_KEY is set")?,
                private_key_pem,
            }),
            None => None,
        };

        let sp = match std::env::var("SAML_SP_ISSUER").ok() {
            Some(issuer) => {
                let signing_key_pem = match (pem_var("SAML_SP_PRIVATE_KEY")?, pem_var("SAML_SP_CERT")?) {
                    (Some(key), Some(cert)) => Some((key, cert)),
                    (None, None) => None,
                    _ => bail!("SAML_SP_PRIVATE_KEY and SAML_SP_CERT must be set together"),
                };
                Some(SpConfig {
                    issuer,
                    acs_url: required_var("SAML_SP_ACS")?,
                    idp_entrypoint: required_var("SAML_IDP_ENTRYPOINT")?,
                    idp_issuer: required_var("SAML_IDP_ISSUER")?,
                    idp_certificate_pem: pem_var("SAML_IDP_CERT")?
                        .context("SAML_IDP_CERT is required when SAML_SP_ISSUER is set")?,
                    signing_key_pem,
                })
            }
            None => None,
        };

        if idp.is_none() && sp.is_none() {
            bail!("no SAML role configured: set MYIDP_PRIVATE_KEY for the IdP or SAML_SP_ISSUER for the SP");
        }

        let signing_mode = match std::env::var("SAML_SIGNING_MODE") {
            Ok(value) => SigningMode::parse(&value)
                .with_context(|| format!("SAML_SIGNING_MODE must be `assertion` or `response`, got `{value}`"))?,
            Err(_) => SigningMode::default(),
        };

        Ok(Self {
            host,
            port,
            base_url,
            idp_metadata_path: metadata_path("IDP_METADATA_PATH", DEFAULT_IDP_METADATA_PATH),
            sp_metadata_path: metadata_path("SP_METADATA_PATH", DEFAULT_SP_METADATA_PATH),
            idp,
            sp,
            assertion_validity_secs: parsed_var("SAML_ASSERTION_VALIDITY_SECS", 300)?,
            clock_skew_secs: parsed_var("SAML_CLOCK_SKEW_SECS", 120)?,
            signing_mode,
            default_subject: std::env::var("SAML_DEFAULT_SUBJECT")
                .unwrap_or_else(|_| "test@example.com".to_string()),
        })
    }

    /// Creates a configuration for testing.
    ///
    /// Both roles are enabled and the SP logs in against this server's own
    /// IdP, so one process can run the whole exchange.
    #[must_use]
    pub fn for_testing(base_url: &str, certificate_pem: &str, private_key_pem: &str) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            base_url: base_url.to_string(),
            idp_metadata_path: None,
            sp_metadata_path: None,
            idp: Some(IdpConfig {
                entity_id: format!("{base_url}/metadata"),
                login_url: format!("{base_url}/saml/login"),
                certificate_pem: certificate_pem.to_string(),
                private_key_pem: private_key_pem.to_string(),
            }),
            sp: Some(SpConfig {
                issuer: format!("{base_url}/saml/sp"),
                acs_url: format!("{base_url}/saml/acs"),
                idp_entrypoint: format!("{base_url}/saml/login"),
                idp_issuer: format!("{base_url}/metadata"),
                idp_certificate_pem: certificate_pem.to_string(),
                signing_key_pem: None,
            }),
            assertion_validity_secs: 300,
            clock_skew_secs: 120,
            signing_mode: SigningMode::default(),
            default_subject: "test@example.com".to_string(),
        }
    }

    /// Returns the assertion validity window.
    #[must_use]
    pub fn assertion_validity(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.assertion_validity_secs).unwrap_or(i64::MAX))
    }

    /// Returns the validation clock skew.
    #[must_use]
    pub fn clock_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.clock_skew_secs).unwrap_or(i64::MAX))
    }
}

fn required_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} environment variable is required"))
}

fn parsed_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(value) => value.trim().parse().with_context(|| format!("{name} is not valid: `{value}`")),
        Err(_) => Ok(default),
    }
}

/// Reads a PEM value given inline or as a path to a PEM file.
///
/// Errors name the variable, never the value.
fn pem_var(name: &str) -> anyhow::Result<Option<String>> {
    match std::env::var(name) {
        Ok(value) => read_pem(&value).with_context(|| format!("{name}: cannot read PEM")).map(Some),
        Err(_) => Ok(None),
    }
}

/// Returns `value` if it is PEM text, otherwise the contents of the file it names.
pub(crate) fn read_pem(value: &str) -> anyhow::Result<String> {
    if value.contains("-----BEGIN") {
        return Ok(value.replace("\\n", "\n"));
    }
    let path = Path::new(value.trim());
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

/// An explicitly configured path is always used; the default only if it exists.
fn metadata_path(name: &str, default: &str) -> Option<PathBuf> {
    match std::env::var(name) {
        Ok(path) => Some(PathBuf::from(path)),
        Err(_) => Some(PathBuf::from(default)).filter(|path| path.exists()),
    }
}
