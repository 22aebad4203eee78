//! Router configuration.
//!
//! This module creates the Axum router for both SAML roles.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Creates the application router.
pub fn create_router(state: AppState) -> Router {
    // IdP role
    let idp = Router::new()
        .route("/metadata", get(handlers::idp_metadata))
        .route("/saml/login", get(handlers::saml_login).post(handlers::saml_login))
        .route("/login", get(handlers::login_page))
        .route("/saml/initiate", post(handlers::initiate));

    // SP role
    let sp = Router::new()
        .route("/saml/sp/metadata", get(handlers::sp_metadata))
        .route("/saml/sp/login", get(handlers::sp_login))
        .route("/saml/acs", post(handlers::acs));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(idp)
        .merge(sp)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
