//! End-to-end tests for the SAML SSO server live under `tests/`.
