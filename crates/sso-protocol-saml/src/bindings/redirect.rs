//! HTTP-Redirect Binding implementation.
//!
//! Implements the SAML 2.0 HTTP-Redirect binding for sending SAML messages
//! via URL query parameters with DEFLATE compression.

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{Read, Write};

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::SamlBinding;

use super::{
    missing_field, utf8, DecodedMessage, RedirectSignature, SamlMessageType, SamlParams,
    MAX_ENCODED_SIZE_REDIRECT, MAX_INFLATED_SIZE,
};

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Encodes a SAML request for HTTP-Redirect binding.
    ///
    /// Returns a URL with the encoded message in query parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if compression fails.
    pub fn encode_request(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
    ) -> SamlResult<String> {
        Self::encode(xml, destination, relay_state, SamlMessageType::Request, None)
    }

    /// Encodes a SAML message for HTTP-Redirect binding.
    ///
    /// With a signer the query gains `SigAlg` and `Signature`, computed over
    /// `SAMLRequest=..&RelayState=..&SigAlg=..` exactly as emitted.
    ///
    /// # Errors
    ///
    /// Returns an error if compression or signing fails.
    pub fn encode(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        message_type: SamlMessageType,
        signer: Option<&XmlSigner>,
    ) -> SamlResult<String> {
        let compressed = deflate_compress(xml.as_bytes())?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&compressed);

        let mut query = format!("{}={}", message_type.form_param(), urlencoding::encode(&encoded));
        if let Some(rs) = relay_state {
            query.push_str(&format!("&RelayState={}", urlencoding::encode(rs)));
        }

        if let Some(signer) = signer {
            let sig_alg = signer.config().algorithm.xml_dsig_uri();
            query.push_str(&format!("&SigAlg={}", urlencoding::encode(sig_alg)));
            let signature = signer.sign_redirect_query(&query)?;
            query.push_str(&format!("&Signature={}", urlencoding::encode(&signature)));
        }

        let separator = if destination.contains('?') { '&' } else { '?' };
        Ok(format!("{destination}{separator}{query}"))
    }

    /// Decodes a SAML message from parsed query parameters.
    ///
    /// Any detached signature is dropped because the signed octets cannot
    /// be rebuilt from decoded values; use [`Self::decode_query`] to keep it.
    ///
    /// # Errors
    ///
    /// Returns `Decoding` if the field is missing or malformed.
    pub fn decode(params: &SamlParams, message_type: SamlMessageType) -> SamlResult<DecodedMessage> {
        let encoded = params.message(message_type).ok_or_else(|| missing_field(message_type))?;

        Ok(DecodedMessage {
            xml: Self::decode_message(encoded)?,
            message_type,
            binding: SamlBinding::HttpRedirect,
            relay_state: params.relay_state.clone(),
            signature: None,
        })
    }

    /// Decodes a SAML message from a raw query string, keeping the exact
    /// signed octets when `SigAlg` and `Signature` are present.
    ///
    /// # Errors
    ///
    /// Returns `Decoding` if the field is missing or malformed.
    pub fn decode_query(raw_query: &str, message_type: SamlMessageType) -> SamlResult<DecodedMessage> {
        let raw_query = raw_query.trim_start_matches('?');
        let params = SamlParams::from_urlencoded(raw_query);
        let mut decoded = Self::decode(&params, message_type)?;

        if let (Some(sig_alg), Some(signature)) = (params.sig_alg, params.signature) {
            decoded.signature = Some(RedirectSignature {
                sig_alg,
                signature,
                signed_query: signed_octets(raw_query, message_type)?,
            });
        }

        Ok(decoded)
    }

    /// Decodes a message from a full URL.
    ///
    /// # Errors
    ///
    /// Returns `Decoding` if the URL or its message is malformed.
    pub fn decode_url(url: &str, message_type: SamlMessageType) -> SamlResult<DecodedMessage> {
        let parsed = url::Url::parse(url).map_err(|e| SamlError::Decoding(format!("invalid URL: {e}")))?;
        Self::decode_query(parsed.query().unwrap_or_default(), message_type)
    }

    /// URL-decoded field value to XML: base64 then inflate.
    ///
    /// # Errors
    ///
    /// Returns `Decoding` on oversize input, bad base64, bad DEFLATE data
    /// or non UTF-8 content.
    pub fn decode_message(encoded: &str) -> SamlResult<String> {
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if compact.len() > MAX_ENCODED_SIZE_REDIRECT {
            return Err(SamlError::Decoding("Redirect message exceeds size limit".to_string()));
        }
        let compressed = base64::engine::general_purpose::STANDARD.decode(compact)?;
        utf8(deflate_decompress(&compressed)?)
    }
}

/// Rebuilds `SAMLRequest=..&RelayState=..&SigAlg=..` from the raw query,
/// keeping each value exactly as it was URL-encoded on the wire.
fn signed_octets(raw_query: &str, message_type: SamlMessageType) -> SamlResult<String> {
    let raw_value = |name: &str| {
        raw_query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    };

    let message = raw_value(message_type.form_param()).ok_or_else(|| missing_field(message_type))?;
    let sig_alg = raw_value("SigAlg").ok_or_else(|| SamlError::Decoding("missing SigAlg parameter".to_string()))?;

    let mut signed = format!("{}={}", message_type.form_param(), message);
    if let Some(relay_state) = raw_value("RelayState") {
        signed.push_str(&format!("&RelayState={relay_state}"));
    }
    signed.push_str(&format!("&SigAlg={sig_alg}"));
    Ok(signed)
}

/// Compresses data using DEFLATE (raw, no zlib header).
fn deflate_compress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompresses DEFLATE data, refusing output larger than the inflate limit.
fn deflate_decompress(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decompressed = Vec::new();
    DeflateDecoder::new(data)
        .take(MAX_INFLATED_SIZE as u64 + 1)
        .read_to_end(&mut decompressed)?;
    if decompressed.len() > MAX_INFLATED_SIZE {
        return Err(SamlError::Decoding("inflated message exceeds size limit".to_string()));
    }
    Ok(decompressed)
}
