//! Common test utilities and fixtures.

use std::time::Duration;

use reqwest::{redirect, Client};
use tokio::net::TcpListener;

use sso_server::{Server, ServerConfig};

const IDP_CERT: &str = include_str!("../../../crates/sso-protocol-saml/testdata/idp-cert.pem");
const IDP_KEY: &str = include_str!("../../../crates/sso-protocol-saml/testdata/idp-key.pem");

/// A running server and a client that does not follow redirects.
pub struct TestEnv {
    /// Base URL of the running server.
    pub base_url: String,
    /// HTTP client for testing.
    pub client: Client,
}

impl TestEnv {
    /// Starts a server whose SP role logs in against its own IdP role.
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(|_| {}).await
    }

    /// Starts a server after letting `adjust` change the testing config.
    pub async fn with_config(adjust: impl FnOnce(&mut ServerConfig)) -> anyhow::Result<Self> {
        // Initialize tracing for tests
        let _ = tracing_subscriber::fmt()
            .with_env_filter("sso_server=debug,sso_protocol_saml=debug")
            .try_init();

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let mut config = ServerConfig::for_testing(&base_url, IDP_CERT, IDP_KEY);
        adjust(&mut config);
        let server = Server::new(config)?;
        tokio::spawn(async move {
            if let Err(e) = server.run_with_listener(listener).await {
                eprintln!("server error: {e:#}");
            }
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self { base_url, client })
    }

    /// Returns an absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Extracts the value of the hidden input `name` from an auto-submit form.
pub fn form_field(html: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{name}\" value=\"");
    let start = html.find(&marker)? + marker.len();
    let end = html[start..].find('"')?;
    Some(html[start..start + end].replace("&amp;", "&").replace("&quot;", "\""))
}

/// Extracts the form action URL.
pub fn form_action(html: &str) -> Option<String> {
    let start = html.find("action=\"")? + "action=\"".len();
    let end = html[start..].find('"')?;
    Some(html[start..start + end].to_string())
}
