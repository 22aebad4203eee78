//! Protocol message identifiers.

/// Generates a fresh SAML `ID` value.
///
/// The value is `_` followed by a random (v4) UUID. UUID v4 draws from the
/// operating system CSPRNG, and the leading underscore keeps the value a
/// valid `xs:ID` (which may not start with a digit).
#[must_use]
pub fn generate_saml_id() -> String {
    format!("_{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn id_is_valid_ncname() {
        let id = generate_saml_id();
        assert!(id.starts_with('_'));
        assert_eq!(id.len(), 37);
    }

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_saml_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
