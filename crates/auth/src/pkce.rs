//! PKCE (Proof Key for Code Exchange) and random token helpers.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// The only challenge method we send.
pub const PKCE_METHOD_S256: &str = "S256";

/// Generates `bytes` random bytes encoded as unpadded base64url.
///
/// Used for session identifiers, OIDC `state`/`nonce` values and PKCE
/// verifiers.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(&buf)
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    /// Secret sent when exchanging the code.
    pub verifier: String,
    /// Derived value sent in the authorization URL.
    pub challenge: String,
}

impl PkceChallenge {
    /// Generates a fresh verifier (43 characters) and its challenge.
    pub fn new() -> Self {
        Self::from_verifier(random_token(32))
    }

    /// Rebuilds the pair from a stored verifier.
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = s256_challenge(&verifier);
        Self { verifier, challenge }
    }

    /// Checks a verifier against a challenge.
    pub fn verify(verifier: &str, challenge: &str) -> bool {
        s256_challenge(verifier) == challenge
    }
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

fn s256_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}
