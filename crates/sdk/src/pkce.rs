//! PKCE (Proof Key for Code Exchange) material
//!
//! Implements RFC 7636 proof material plus the anti-CSRF state token for the
//! browser redirect flow. Verifier and state come from the thread-local
//! CSPRNG; the challenge is `BASE64URL(SHA256(ASCII(code_verifier)))`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Verifier entropy in bytes. 32 bytes encode to 43 base64url characters,
/// the RFC 7636 minimum.
const VERIFIER_BYTES: usize = 32;

/// State-token entropy in bytes. CSRF binding only, cryptographically
/// unrelated to the PKCE pair.
const STATE_BYTES: usize = 16;

fn random_urlsafe(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a cryptographically random code verifier.
///
/// Returns a 43-character URL-safe base64 string (no `+`, `/`, or padding),
/// within the RFC 7636 43–128 character bounds.
#[must_use]
pub fn generate_code_verifier() -> String {
    random_urlsafe(VERIFIER_BYTES)
}

/// Compute the S256 code challenge for a verifier.
///
/// Pure and deterministic: SHA-256 over the UTF-8 bytes of the verifier,
/// URL-safe base64 without padding.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Generate a random state token for CSRF binding.
///
/// Bound 1:1 to a single authorization attempt and consumed exactly once by
/// the callback handler.
#[must_use]
pub fn generate_state() -> String {
    random_urlsafe(STATE_BYTES)
}

/// Proof material for one authorization attempt.
///
/// Created immediately before the redirect; the verifier and state are
/// persisted, consumed once by the callback handler, and never reused.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Random secret, kept client-side until token exchange.
    pub code_verifier: String,

    /// SHA-256 digest of the verifier, sent in the authorization request.
    pub code_challenge: String,

    /// Anti-CSRF token round-tripped through the redirect.
    pub state: String,
}

impl PkceChallenge {
    /// Generate a fresh verifier/challenge/state triple.
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        let state = generate_state();

        Self { code_verifier, code_challenge, state }
    }

    /// Challenge method identifier (always `S256`).
    #[must_use]
    pub fn challenge_method(&self) -> &'static str {
        "S256"
    }
}
