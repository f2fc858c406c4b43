//! PKCE verifier/challenge and state-nonce generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// The only challenge method this crate issues.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// A PKCE verifier and its S256 challenge.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    /// Secret verifier, sent only to the token endpoint.
    pub code_verifier: String,
    /// Challenge sent with the authorization request.
    pub code_challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair from 64 random bytes.
    pub fn generate() -> Self {
        let mut random = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut random);
        Self::from_verifier(URL_SAFE_NO_PAD.encode(random))
    }

    /// Build the pair for an existing verifier.
    pub fn from_verifier(code_verifier: impl Into<String>) -> Self {
        let code_verifier = code_verifier.into();
        let code_challenge = code_challenge_s256(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
        }
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

/// Compute the S256 challenge for a verifier.
pub fn code_challenge_s256(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate a random hex state nonce.
pub fn generate_nonce() -> String {
    use std::fmt::Write;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(32), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
