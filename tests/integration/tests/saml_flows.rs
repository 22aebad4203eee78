//! SAML flow integration tests.
//!
//! Tests for metadata, SP-initiated and IdP-initiated logins, and the
//! failure paths of the SSO and ACS endpoints.

use base64::Engine;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;

use sso_protocol_saml::bindings::HttpPostBinding;
use sso_protocol_saml::AuthnRequest;

use crate::common::{form_action, form_field, TestEnv};

const FORM: &str = "application/x-www-form-urlencoded";

/// Follows `/saml/sp/login` to the IdP and returns the auto-submit form HTML.
async fn idp_form_for_sp_login(env: &TestEnv, extra_query: &str) -> anyhow::Result<String> {
    let response = env
        .client
        .get(env.url("/saml/sp/login?RelayState=%2Fdashboard"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| anyhow::anyhow!("missing Location"))?
        .to_string();
    assert!(location.starts_with(&env.url("/saml/login?SAMLRequest=")));

    let response = env.client.get(format!("{location}{extra_query}")).send().await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(response.text().await?)
}

async fn post_to_acs(env: &TestEnv, html: &str) -> anyhow::Result<reqwest::Response> {
    let action = form_action(html).ok_or_else(|| anyhow::anyhow!("no form action"))?;
    assert_eq!(action, env.url("/saml/acs"));

    let saml_response = form_field(html, "SAMLResponse").ok_or_else(|| anyhow::anyhow!("no SAMLResponse"))?;
    post_saml_response(env, &saml_response, form_field(html, "RelayState").as_deref()).await
}

async fn post_saml_response(
    env: &TestEnv,
    saml_response: &str,
    relay_state: Option<&str>,
) -> anyhow::Result<reqwest::Response> {
    let mut body = format!("SAMLResponse={}", url::form_urlencoded::byte_serialize(saml_response.as_bytes()).collect::<String>());
    if let Some(relay_state) = relay_state {
        body.push_str("&RelayState=");
        body.extend(url::form_urlencoded::byte_serialize(relay_state.as_bytes()));
    }
    Ok(env
        .client
        .post(env.url("/saml/acs"))
        .header(CONTENT_TYPE, FORM)
        .body(body)
        .send()
        .await?)
}

#[tokio::test]
async fn test_root_reports_roles() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let body = env.client.get(env.url("/")).send().await?.text().await?;
    assert_eq!(body, "SAML SSO actor running (IdP enabled, SP enabled)");
    Ok(())
}

#[tokio::test]
async fn test_idp_metadata_endpoint() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let response = env.client.get(env.url("/metadata")).send().await?;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert_eq!(content_type, "application/xml");

    let body = response.text().await?;
    assert!(body.contains(&format!("entityID=\"{}\"", env.url("/metadata"))));
    assert!(body.contains("IDPSSODescriptor"));
    assert!(body.contains("WantAuthnRequestsSigned=\"false\""));
    assert!(body.contains("SingleSignOnService"));
    assert!(body.contains("X509Certificate"));
    Ok(())
}

#[tokio::test]
async fn test_sp_metadata_endpoint() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let body = env.client.get(env.url("/saml/sp/metadata")).send().await?.text().await?;
    assert!(body.contains("SPSSODescriptor"));
    assert!(body.contains("WantAssertionsSigned=\"true\""));
    assert!(body.contains(&format!("Location=\"{}\"", env.url("/saml/acs"))));
    Ok(())
}

#[tokio::test]
async fn test_login_without_saml_request() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.client.get(env.url("/saml/login")).send().await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.text().await?,
        "No SAMLRequest found (expected GET query or POST body)."
    );

    let response = env
        .client
        .post(env.url("/saml/login"))
        .header(CONTENT_TYPE, FORM)
        .body("RelayState=x")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_malformed_saml_request() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let response = env
        .client
        .get(env.url("/saml/login?SAMLRequest=not-deflated"))
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_sp_initiated_login() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let html = idp_form_for_sp_login(&env, "").await?;
    assert_eq!(form_field(&html, "RelayState").as_deref(), Some("/dashboard"));

    let response = post_to_acs(&env, &html).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let page = response.text().await?;
    assert!(page.contains("Welcome, test@example.com"));
    assert!(page.contains("firstName"));
    assert!(page.contains("Snow"));
    assert!(page.contains("dashboard"));
    assert!(page.contains("a login this service started"));
    Ok(())
}

#[tokio::test]
async fn test_login_uses_email_field() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let html = idp_form_for_sp_login(&env, "&email=arya%40example.test").await?;

    let page = post_to_acs(&env, &html).await?.text().await?;
    assert!(page.contains("Welcome, arya@example.test"));
    Ok(())
}

#[tokio::test]
async fn test_response_cannot_be_replayed() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let html = idp_form_for_sp_login(&env, "").await?;

    assert_eq!(post_to_acs(&env, &html).await?.status(), StatusCode::OK);
    let replay = post_to_acs(&env, &html).await?;
    assert_eq!(replay.status(), StatusCode::FORBIDDEN);
    assert!(replay.text().await?.contains("InResponseTo mismatch"));
    Ok(())
}

#[tokio::test]
async fn test_forged_post_does_not_burn_pending_request() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let html = idp_form_for_sp_login(&env, "").await?;

    let engine = base64::engine::general_purpose::STANDARD;
    let saml_response = form_field(&html, "SAMLResponse").ok_or_else(|| anyhow::anyhow!("no SAMLResponse"))?;
    let xml = String::from_utf8(engine.decode(&saml_response)?)?;
    let forged = engine.encode(xml.replace("test@example.com", "mallory@example.com"));

    let rejected = post_saml_response(&env, &forged, None).await?;
    assert_eq!(rejected.status(), StatusCode::FORBIDDEN);

    let response = post_to_acs(&env, &html).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await?.contains("a login this service started"));
    Ok(())
}

#[tokio::test]
async fn test_idp_initiated_login() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let login_page = env.client.get(env.url("/login")).send().await?.text().await?;
    assert!(login_page.contains("name=\"email\""));

    let response = env
        .client
        .post(env.url("/saml/initiate"))
        .header(CONTENT_TYPE, FORM)
        .body("email=sansa%40example.test&RelayState=%2Fhome")
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = response.text().await?;

    let response = post_to_acs(&env, &html).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let page = response.text().await?;
    assert!(page.contains("Welcome, sansa@example.test"));
    assert!(page.contains("identity provider initiated"));
    Ok(())
}

#[tokio::test]
async fn test_tampered_response_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let html = env
        .client
        .post(env.url("/saml/initiate"))
        .header(CONTENT_TYPE, FORM)
        .body("email=sansa%40example.test")
        .send()
        .await?
        .text()
        .await?;

    let engine = base64::engine::general_purpose::STANDARD;
    let saml_response = form_field(&html, "SAMLResponse").ok_or_else(|| anyhow::anyhow!("no SAMLResponse"))?;
    let xml = String::from_utf8(engine.decode(saml_response)?)?;
    let forged = engine.encode(xml.replace("sansa@example.test", "cersei@example.test"));

    let response = post_saml_response(&env, &forged, None).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.text().await?.contains("signature validation failed"));
    Ok(())
}

#[tokio::test]
async fn test_post_binding_authn_request() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let request = AuthnRequest::new(env.url("/saml/sp"))
        .with_destination(env.url("/saml/login"))
        .with_acs_url(env.url("/saml/acs"));
    let encoded = HttpPostBinding::encode_message(&request.to_xml());
    let body = format!(
        "SAMLRequest={}&RelayState=post-state&email=bran%40example.test",
        url::form_urlencoded::byte_serialize(encoded.as_bytes()).collect::<String>()
    );

    let response = env
        .client
        .post(env.url("/saml/login"))
        .header(CONTENT_TYPE, FORM)
        .body(body)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = response.text().await?;
    assert_eq!(form_field(&html, "RelayState").as_deref(), Some("post-state"));

    let engine = base64::engine::general_purpose::STANDARD;
    let saml_response = form_field(&html, "SAMLResponse").ok_or_else(|| anyhow::anyhow!("no SAMLResponse"))?;
    let xml = String::from_utf8(engine.decode(saml_response)?)?;
    assert!(xml.contains(&format!("InResponseTo=\"{}\"", request.id)));
    assert!(xml.contains("bran@example.test"));
    Ok(())
}

#[tokio::test]
async fn test_request_from_unknown_sp_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let request = AuthnRequest::new("https://rogue.example.test").with_destination(env.url("/saml/login"));
    let encoded = HttpPostBinding::encode_message(&request.to_xml());
    let body = format!(
        "SAMLRequest={}",
        url::form_urlencoded::byte_serialize(encoded.as_bytes()).collect::<String>()
    );

    let response = env
        .client
        .post(env.url("/saml/login"))
        .header(CONTENT_TYPE, FORM)
        .body(body)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_sp_only_server_has_no_idp_routes() -> anyhow::Result<()> {
    let env = TestEnv::with_config(|config| config.idp = None).await?;
    let response = env.client.get(env.url("/metadata")).send().await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = env.client.get(env.url("/saml/sp/login")).send().await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    Ok(())
}
