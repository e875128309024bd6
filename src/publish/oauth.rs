//! OAuth 1.0a request signing (RFC 5849, HMAC-SHA1).
//!
//! Pure functions: the nonce and timestamp are supplied by the caller so a
//! signature can be reproduced exactly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Invalid signing key")]
    InvalidKey,
}

/// Consumer and token secrets for one signed request.
#[derive(Clone, Copy)]
pub struct OAuthKeys<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    pub token: &'a str,
    pub token_secret: &'a str,
}

/// Percent-encodes per RFC 3986: everything but `A-Z a-z 0-9 - . _ ~`.
fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

fn oauth_params<'a>(keys: &OAuthKeys<'a>, nonce: &'a str, timestamp: &'a str) -> [(&'a str, &'a str); 6] {
    [
        ("oauth_consumer_key", keys.consumer_key),
        ("oauth_nonce", nonce),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", timestamp),
        ("oauth_token", keys.token),
        ("oauth_version", "1.0"),
    ]
}

/// Builds the signature base string: `METHOD&url&params`, with the
/// parameters encoded, sorted, and joined.
pub fn signature_base_string(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> =
        params.iter().map(|(k, v)| (encode(k), encode(v))).collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        encode(url),
        encode(&param_string)
    )
}

pub fn sign(base_string: &str, consumer_secret: &str, token_secret: &str) -> Result<String, OAuthError> {
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes()).map_err(|_| OAuthError::InvalidKey)?;
    mac.update(base_string.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Builds the `Authorization: OAuth ...` header value for one request.
///
/// `url` must not carry a query string; query and form-body parameters
/// belong in `request_params` so they are covered by the signature. JSON
/// bodies are not signed.
pub fn authorization_header(
    method: &str,
    url: &str,
    request_params: &[(&str, &str)],
    keys: &OAuthKeys<'_>,
    nonce: &str,
    timestamp: i64,
) -> Result<String, OAuthError> {
    let timestamp = timestamp.to_string();
    let oauth = oauth_params(keys, nonce, &timestamp);

    let mut all_params: Vec<(&str, &str)> = oauth.to_vec();
    all_params.extend_from_slice(request_params);

    let base_string = signature_base_string(method, url, &all_params);
    let signature = sign(&base_string, keys.consumer_secret, keys.token_secret)?;

    let mut header_params: Vec<(&str, &str)> = oauth.to_vec();
    header_params.push(("oauth_signature", signature.as_str()));
    header_params.sort();

    let fields = header_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("OAuth {}", fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Worked example from Twitter's "Creating a signature" documentation
    const KEYS: OAuthKeys<'static> = OAuthKeys {
        consumer_key: "xvz1evFS4wEEPTGEFPHBog",
        consumer_secret: "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
        token: "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
        token_secret: "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
    };
    const NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const TIMESTAMP: i64 = 1318622958;
    const URL: &str = "https://api.twitter.com/1.1/statuses/update.json";
    const PARAMS: &[(&str, &str)] = &[
        ("include_entities", "true"),
        ("status", "Hello Ladies + Gentlemen, a signed OAuth request!"),
    ];

    #[test]
    fn test_signature_base_string() {
        let timestamp = TIMESTAMP.to_string();
        let mut params = oauth_params(&KEYS, NONCE, &timestamp).to_vec();
        params.extend_from_slice(PARAMS);

        assert_eq!(
            signature_base_string("post", URL, &params),
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&include_entities%3Dtrue%26oauth_consumer_key%3Dxvz1evFS4wEEPTGEFPHBog%26oauth_nonce%3DkYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg%26oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1318622958%26oauth_token%3D370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb%26oauth_version%3D1.0%26status%3DHello%2520Ladies%2520%252B%2520Gentlemen%252C%2520a%2520signed%2520OAuth%2520request%2521"
        );
    }

    #[test]
    fn test_sign_matches_reference() {
        let timestamp = TIMESTAMP.to_string();
        let mut params = oauth_params(&KEYS, NONCE, &timestamp).to_vec();
        params.extend_from_slice(PARAMS);
        let base_string = signature_base_string("POST", URL, &params);

        assert_eq!(
            sign(&base_string, KEYS.consumer_secret, KEYS.token_secret).unwrap(),
            "hCtSmYh+iHYCEqBWrE7C7hYmtUk="
        );
    }

    #[test]
    fn test_authorization_header_matches_reference() {
        let header = authorization_header("POST", URL, PARAMS, &KEYS, NONCE, TIMESTAMP).unwrap();
        assert_eq!(
            header,
            "OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", \
             oauth_nonce=\"kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg\", \
             oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\", \
             oauth_signature_method=\"HMAC-SHA1\", \
             oauth_timestamp=\"1318622958\", \
             oauth_token=\"370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb\", \
             oauth_version=\"1.0\""
        );
    }

    #[test]
    fn test_signature_depends_on_params() {
        let a = authorization_header("POST", URL, &[], &KEYS, NONCE, TIMESTAMP).unwrap();
        let b = authorization_header("POST", URL, PARAMS, &KEYS, NONCE, TIMESTAMP).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_encode_reserved_characters() {
        assert_eq!(encode("a b+c/d~e"), "a%20b%2Bc%2Fd~e");
        assert_eq!(encode("Ünï"), "%C3%9Cn%C3%AF");
    }
}
