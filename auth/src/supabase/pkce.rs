//! PKCE verifier and challenge generation for redirect-based sign-in.

#[cfg(test)]
#[path = "pkce_test.rs"]
mod pkce_test;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Unreserved characters allowed in a code verifier.
const VERIFIER_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
const VERIFIER_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Kept client-side until the code exchange.
    pub verifier: String,
    /// Sent with the authorization request.
    pub challenge: String,
}

impl PkcePair {
    #[must_use]
    pub fn generate() -> Self {
        let verifier = generate_verifier();
        let challenge = challenge_for(&verifier);
        Self { verifier, challenge }
    }
}

#[must_use]
pub fn generate_verifier() -> String {
    let mut rng = rand::rng();
    (0..VERIFIER_LEN)
        .map(|_| {
            let idx = rng.random_range(0..VERIFIER_ALPHABET.len());
            VERIFIER_ALPHABET[idx] as char
        })
        .collect()
}

/// `base64url(sha256(verifier))` without padding.
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
