//! HTML pages.
//!
//! Rendered with askama; every interpolated value is HTML-escaped.

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use sso_protocol_saml::{Assertion, SamlError};

/// IdP-initiated login form.
#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    /// Prefilled email.
    pub default_subject: String,
    /// Service provider the response goes to.
    pub sp_entity_id: String,
    /// Form action URL.
    pub action_url: String,
}

/// Page shown after a validated login.
#[derive(Template)]
#[template(path = "welcome.html")]
pub struct WelcomeTemplate {
    /// Authenticated subject.
    pub subject: String,
    /// Attribute names with their values joined.
    pub attributes: Vec<(String, String)>,
    /// RelayState posted with the response.
    pub relay_state: Option<String>,
    /// Whether the response answered our own request.
    pub solicited: bool,
}

impl WelcomeTemplate {
    /// Builds the page for a validated assertion.
    pub fn new(assertion: &Assertion, relay_state: Option<String>, solicited: bool) -> Self {
        Self {
            subject: assertion.subject_name_id().to_string(),
            attributes: assertion
                .attributes
                .iter()
                .map(|attribute| (attribute.name.clone(), attribute.values.join(", ")))
                .collect(),
            relay_state,
            solicited,
        }
    }
}

/// Error page.
#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    /// HTTP status line.
    pub status: String,
    /// Error message.
    pub error: String,
}

/// Renders `template` with a 200 status.
pub fn render<T: Template>(template: &T) -> Response {
    render_with_status(StatusCode::OK, template)
}

/// Renders the error page for a SAML failure with its mapped status.
pub fn saml_error(err: &SamlError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_page(status, &err.to_string())
}

/// Renders the error page.
pub fn error_page(status: StatusCode, error: &str) -> Response {
    let template = ErrorTemplate {
        status: status.to_string(),
        error: error.to_string(),
    };
    render_with_status(status, &template)
}

fn render_with_status<T: Template>(status: StatusCode, template: &T) -> Response {
    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Template render error: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}
