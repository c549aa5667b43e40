//! PKCE (RFC 7636) verifier/challenge generation and `S256` verification.
//!
//! Implemented directly against `sha2`/`subtle`/`base64` rather than the
//! `oauth2` crate, whose typestate client this workspace doesn't depend on
//! (see the `client::state_machine` module docs for why).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Only transform this spec supports (RFC 7636 §4.2): `plain` is rejected.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

/// A PKCE verifier/challenge pair generated for one authorization attempt.
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// The secret the client retains and presents at the token endpoint.
    pub verifier: String,
    /// The `S256` digest of `verifier`, sent in the authorize request.
    pub challenge: String,
}

/// Generate a new verifier (43 random base64url characters, the RFC 7636
/// minimum-entropy length) and its `S256` challenge.
pub fn generate() -> PkcePair {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = challenge_for(&verifier);
    PkcePair { verifier, challenge }
}

/// Derive the `S256` challenge for a given verifier.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Verify that `verifier` hashes to `expected_challenge`, in constant time.
pub fn verify(verifier: &str, expected_challenge: &str) -> bool {
    let computed = challenge_for(verifier);
    computed.as_bytes().ct_eq(expected_challenge.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_pair_verifies() {
        let pair = generate();
        assert!(verify(&pair.verifier, &pair.challenge));
    }

    #[test]
    fn wrong_verifier_fails() {
        let pair = generate();
        assert!(!verify("not-the-verifier", &pair.challenge));
    }

    #[test]
    fn verifier_has_sufficient_entropy() {
        let pair = generate();
        assert!(pair.verifier.len() >= 43);
    }
}
