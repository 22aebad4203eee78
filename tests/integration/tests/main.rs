//! End-to-End Integration Tests
//!
//! These tests start the server on an ephemeral port with both SAML roles
//! enabled and drive complete exchanges over HTTP.

mod common;
mod saml_flows;
