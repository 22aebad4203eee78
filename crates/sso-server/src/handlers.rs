//! Route handlers.
//!
//! Handlers take a snapshot of the actors, hand the raw request pieces to
//! the framework-agnostic endpoint functions, and map the outcome to HTTP.

use axum::{
    extract::{Query, RawQuery, State},
    http::{header, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use sso_protocol_saml::endpoints::{
    detect_binding, process_acs, process_login, process_unsolicited, start_login, HttpMethod,
    InboundRequest, NO_SAML_REQUEST,
};
use sso_protocol_saml::{Attribute, EncodedMessage};
use tracing::{debug, info};

use crate::pages::{self, LoginTemplate, WelcomeTemplate};
use crate::state::AppState;

/// Form posted by the IdP-initiated login page.
#[derive(Debug, Deserialize)]
pub struct InitiateForm {
    /// Subject email.
    pub email: Option<String>,
    /// RelayState to send along.
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// Query of the SP login route.
#[derive(Debug, Deserialize)]
pub struct SpLoginQuery {
    /// RelayState to echo through the exchange.
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// Plain status text.
pub async fn root(State(state): State<AppState>) -> String {
    let actors = state.actors.load();
    let enabled = |on: bool| if on { "enabled" } else { "disabled" };
    format!(
        "SAML SSO actor running (IdP {}, SP {})",
        enabled(actors.idp.is_some()),
        enabled(actors.sp.is_some())
    )
}

/// Liveness probe.
pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// IdP metadata.
pub async fn idp_metadata(State(state): State<AppState>) -> Response {
    match &state.actors.load().idp {
        Some(idp) => xml_response(idp.idp().to_metadata_xml()),
        None => role_disabled("IdP"),
    }
}

/// SP metadata.
pub async fn sp_metadata(State(state): State<AppState>) -> Response {
    match &state.actors.load().sp {
        Some(sp) => xml_response(sp.sp().to_metadata_xml()),
        None => role_disabled("SP"),
    }
}

/// SSO endpoint: answers an AuthnRequest with a signed Response.
///
/// The subject is the `email` field of the request, or the configured
/// default subject.
pub async fn saml_login(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
    body: String,
) -> Response {
    let actors = state.actors.load();
    let Some(idp) = &actors.idp else {
        return role_disabled("IdP");
    };

    let inbound = InboundRequest {
        method: if method == Method::POST { HttpMethod::Post } else { HttpMethod::Get },
        query,
        body: Some(body).filter(|body| !body.is_empty()),
    };
    let Some((binding, raw)) = detect_binding(&inbound) else {
        return (StatusCode::BAD_REQUEST, NO_SAML_REQUEST).into_response();
    };
    debug!(%binding, "received SAMLRequest");

    let email = form_value(raw, "email").unwrap_or_else(|| state.config.default_subject.clone());
    match process_login(idp, binding, raw, &email, subject_attributes(&email)) {
        Ok(message) => encoded_response(message),
        Err(err) => pages::saml_error(&err),
    }
}

/// IdP-initiated login form.
pub async fn login_page(State(state): State<AppState>) -> Response {
    match &state.actors.load().idp {
        Some(idp) => pages::render(&LoginTemplate {
            default_subject: state.config.default_subject.clone(),
            sp_entity_id: idp.sp().entity_id().to_string(),
            action_url: "/saml/initiate".to_string(),
        }),
        None => role_disabled("IdP"),
    }
}

/// Issues an unsolicited Response for the submitted email.
pub async fn initiate(State(state): State<AppState>, Form(form): Form<InitiateForm>) -> Response {
    let actors = state.actors.load();
    let Some(idp) = &actors.idp else {
        return role_disabled("IdP");
    };

    let email = form
        .email
        .filter(|email| !email.trim().is_empty())
        .unwrap_or_else(|| state.config.default_subject.clone());
    info!(sp = idp.sp().entity_id(), "IdP-initiated login");
    match process_unsolicited(idp, &email, subject_attributes(&email), form.relay_state.as_deref()) {
        Ok(message) => encoded_response(message),
        Err(err) => pages::saml_error(&err),
    }
}

/// Starts an SP-initiated login by sending the browser to the IdP.
pub async fn sp_login(State(state): State<AppState>, Query(query): Query<SpLoginQuery>) -> Response {
    let actors = state.actors.load();
    let Some(sp) = &actors.sp else {
        return role_disabled("SP");
    };

    match start_login(sp, query.relay_state.as_deref()) {
        Ok(start) => {
            state.pending.insert(start.request_id);
            encoded_response(start.message)
        }
        Err(err) => pages::saml_error(&err),
    }
}

/// Assertion consumer service.
pub async fn acs(State(state): State<AppState>, body: String) -> Response {
    let actors = state.actors.load();
    let Some(sp) = &actors.sp else {
        return role_disabled("SP");
    };

    match process_acs(sp, &body, state.pending.as_ref()) {
        Ok(outcome) => {
            info!(solicited = outcome.solicited, "login completed");
            pages::render(&WelcomeTemplate::new(&outcome.assertion, outcome.relay_state, outcome.solicited))
        }
        Err(err) => pages::saml_error(&err),
    }
}

/// Attributes released for a subject.
fn subject_attributes(email: &str) -> Vec<Attribute> {
    vec![
        Attribute::single("firstName", "Jon"),
        Attribute::single("lastName", "Snow"),
        Attribute::single("email", email),
    ]
}

fn form_value(raw: &str, name: &str) -> Option<String> {
    url::form_urlencoded::parse(raw.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn encoded_response(message: EncodedMessage) -> Response {
    match message {
        EncodedMessage::Post { html, .. } => Html(html).into_response(),
        EncodedMessage::Redirect { url } => (StatusCode::FOUND, [(header::LOCATION, url)]).into_response(),
    }
}

fn xml_response(xml: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], xml).into_response()
}

fn role_disabled(role: &str) -> Response {
    pages::error_page(StatusCode::NOT_FOUND, &format!("the {role} role is not enabled on this server"))
}
