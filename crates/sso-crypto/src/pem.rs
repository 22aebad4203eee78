//! PEM armour handling.

use base64::Engine;

use crate::error::{CryptoError, CryptoResult};

/// Strips PEM armour and decodes the base64 body.
///
/// Accepts any `-----BEGIN ...-----` label. Input without armour is treated
/// as a bare base64 body, which is how certificates appear inside SAML
/// metadata and some environment variables.
///
/// # Errors
///
/// Returns `InvalidPem` if the body is not valid base64 or is empty.
pub fn pem_to_der(pem: &str) -> CryptoResult<Vec<u8>> {
    let body: String = pem
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .flat_map(str::chars)
        .filter(|c| !c.is_whitespace())
        .collect();

    if body.is_empty() {
        return Err(CryptoError::InvalidPem("empty body".to_string()));
    }

    base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|_| CryptoError::InvalidPem("body is not valid base64".to_string()))
}

/// Returns the label of the first PEM block, e.g. `PRIVATE KEY`.
#[must_use]
pub fn pem_label(pem: &str) -> Option<&str> {
    pem.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("-----BEGIN "))
        .and_then(|rest| rest.strip_suffix("-----"))
}
