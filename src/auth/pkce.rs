//! PKCE (RFC 7636) helpers.
//!
//! Only the S256 method is accepted.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The only supported challenge method
pub const S256: &str = "S256";

/// S256 challenge for `verifier`.
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Check `verifier` against a stored S256 `challenge` in constant time.
#[must_use]
pub fn verify(verifier: &str, challenge: &str) -> bool {
    // RFC 7636 §4.1: 43..=128 unreserved characters
    if !(43..=128).contains(&verifier.len()) {
        return false;
    }
    let computed = challenge_for(verifier);
    computed.as_bytes().ct_eq(challenge.as_bytes()).into()
}
