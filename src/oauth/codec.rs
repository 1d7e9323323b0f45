//! Unverified decoding of structured (JWT-shaped) bearer tokens.
//!
//! Signatures are not checked here: the query engine and the provider are the
//! authorities on whether a token is valid. This module only reads claims to
//! decide when to refresh and who the user is.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tokens are treated as expired this long before their `exp` claim so a
/// request does not race the final moments of validity.
pub const EXPIRY_GRACE_MS: i64 = 5_000;

/// Claims are exactly the decoded payload object.
pub type Claims = Map<String, Value>;

const IDENTITY_CLAIMS: &[&str] = &["sub", "email", "name", "preferred_username", "picture"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub subject: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
    /// Every claim not mapped to a field above.
    #[serde(default)]
    pub claims: Claims,
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .ok()
}

/// Decode the payload of a three-segment base64url token.
///
/// Returns `None` for anything else: opaque access tokens are valid bearer
/// credentials, they just carry nothing this module can read.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let mut parts = token.split('.');
    let (header, payload, signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || header.is_empty() || payload.is_empty() {
        return None;
    }

    decode_segment(signature)?;
    let header: Value = serde_json::from_slice(&decode_segment(header)?).ok()?;
    if !header.is_object() {
        return None;
    }
    match serde_json::from_slice(&decode_segment(payload)?).ok()? {
        Value::Object(claims) => Some(claims),
        _ => None,
    }
}

/// The `exp` claim in milliseconds since the epoch, if present and numeric.
/// Values beyond the `i64` range clamp to its bounds.
fn expiry_ms(token: &str) -> Option<i64> {
    let exp = decode_claims(token)?.get("exp")?.as_f64()?;
    let ms = exp * 1000.0;
    ms.is_finite().then_some(ms as i64)
}

pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(expiry_ms(token)?).single()
}

/// Whether `token` should be considered expired at `now_ms`.
///
/// A token without a decodable `exp` is reported as not expired; the
/// provider or the query engine will reject it if it is in fact invalid.
pub fn is_expired_at(token: &str, now_ms: i64) -> bool {
    match expiry_ms(token) {
        Some(exp_ms) => now_ms > exp_ms.saturating_sub(EXPIRY_GRACE_MS),
        None => false,
    }
}

pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now().timestamp_millis())
}

fn string_claim(claims: &Claims, key: &str) -> Option<String> {
    claims
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn extract_identity(token: &str) -> Option<UserIdentity> {
    let claims = decode_claims(token)?;

    let email = string_claim(&claims, "email");
    let display_name = string_claim(&claims, "name")
        .or_else(|| string_claim(&claims, "preferred_username"))
        .or_else(|| email.clone());

    Some(UserIdentity {
        subject: string_claim(&claims, "sub"),
        email,
        display_name,
        picture_url: string_claim(&claims, "picture"),
        claims: claims
            .into_iter()
            .filter(|(k, _)| !IDENTITY_CLAIMS.contains(&k.as_str()))
            .collect(),
    })
}

#[cfg(test)]
pub(crate) fn encode_test_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
