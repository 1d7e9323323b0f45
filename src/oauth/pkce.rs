use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::QauthError;

/// Verifier length used when the caller has no preference (RFC 7636 maximum).
pub const DEFAULT_VERIFIER_LENGTH: usize = 128;
pub const MIN_VERIFIER_LENGTH: usize = 43;
pub const MAX_VERIFIER_LENGTH: usize = 128;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

// Largest multiple of the alphabet size that fits in a byte; bytes at or above
// it are rejected so every character is equally likely.
const REJECT_AT: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
}

/// Random alphanumeric string from the thread-local CSPRNG.
///
/// Panics only if the operating system entropy source is unavailable, which
/// aborts the login instead of producing a weak value.
pub fn random_token(len: usize) -> String {
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];
    while out.len() < len {
        rand::Rng::fill_bytes(&mut rand::rng(), &mut buf);
        for &b in buf.iter().filter(|&&b| b < REJECT_AT) {
            if out.len() == len {
                break;
            }
            out.push(ALPHABET[b as usize % ALPHABET.len()] as char);
        }
    }
    out
}

pub fn generate_verifier(length: usize) -> Result<String, QauthError> {
    if !(MIN_VERIFIER_LENGTH..=MAX_VERIFIER_LENGTH).contains(&length) {
        return Err(QauthError::InvalidConfig(format!(
            "PKCE verifier length must be between {MIN_VERIFIER_LENGTH} and {MAX_VERIFIER_LENGTH}, got {length}"
        )));
    }
    Ok(random_token(length))
}

/// `BASE64URL-NOPAD(SHA256(verifier))`
pub fn derive_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub fn generate_pkce() -> PkceChallenge {
    let code_verifier = random_token(DEFAULT_VERIFIER_LENGTH);
    let code_challenge = derive_challenge(&code_verifier);
    PkceChallenge {
        code_verifier,
        code_challenge,
    }
}
