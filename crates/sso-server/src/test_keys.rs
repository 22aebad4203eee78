pub const IDP_CERT: &str = include_str!("../../sso-protocol-saml/testdata/idp-cert.pem");
pub const IDP_KEY: &str = include_str!("../../sso-protocol-saml/testdata/idp-key.pem");
pub const SP_CERT: &str = include_str!("../../sso-protocol-saml/testdata/sp-cert.pem");
