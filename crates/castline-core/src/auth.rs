//! Challenge-response authentication.
//!
//! On every connection the device issues a fresh [`Challenge`]. The remote
//! controller proves it knows the shared password by answering with
//! [`hash_password`] computed over that challenge, without the password ever
//! crossing the wire.
//!
//! The hash is the two-stage scheme used by OBS-WebSocket style controllers:
//!
//! ```text
//! secret = base64(sha256(password + salt))
//! answer = base64(sha256(secret + challenge))
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Number of random bytes behind each challenge and salt token.
pub const TOKEN_BYTES: usize = 64;

/// Per-connection authentication parameters, sent in the `hello` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge: String,
    pub salt: String,
}

impl Challenge {
    /// Generate a fresh challenge/salt pair from the OS random source.
    pub fn generate() -> Self {
        Self {
            challenge: random_token(),
            salt: random_token(),
        }
    }

    /// The answer a controller holding `password` is expected to send.
    pub fn expected_answer(&self, password: &str) -> String {
        hash_password(&self.challenge, &self.salt, password)
    }

    /// Check an `identify` answer in constant time.
    pub fn verify(&self, password: &str, answer: &str) -> bool {
        let expected = self.expected_answer(password);
        expected.as_bytes().ct_eq(answer.as_bytes()).into()
    }
}

/// A base64 encoded random token of [`TOKEN_BYTES`] bytes.
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64.encode(bytes)
}

/// Compute the authentication answer for `(challenge, salt, password)`.
pub fn hash_password(challenge: &str, salt: &str, password: &str) -> String {
    let secret = Base64.encode(Sha256::digest(format!("{password}{salt}")));
    Base64.encode(Sha256::digest(format!("{secret}{challenge}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = hash_password("challenge", "salt", "secret");
        let b = hash_password("challenge", "salt", "secret");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_matches_reference_scheme() {
        // secret = eje4XIkY6sGakInA+loqtNzj+QUo3N7sEIsj3fNge5k=
        assert_eq!(
            hash_password("challenge", "salt", "password"),
            "zTM5ki6L2vVvBQiTG9ckH1Lh64AbnCf6XZ226UmnkIA="
        );
    }

    #[test]
    fn hash_depends_on_every_input() {
        let base = hash_password("c", "s", "p");
        assert_ne!(base, hash_password("c2", "s", "p"));
        assert_ne!(base, hash_password("c", "s2", "p"));
        assert_ne!(base, hash_password("c", "s", "p2"));
    }

    #[test]
    fn tokens_are_fresh() {
        let token = random_token();
        // 64 bytes -> 88 padded base64 characters.
        assert_eq!(token.len(), 88);
        assert_ne!(token, random_token());

        assert_ne!(Challenge::generate(), Challenge::generate());
    }

    #[test]
    fn verify_accepts_only_the_right_password() {
        let challenge = Challenge::generate();
        let right = hash_password(&challenge.challenge, &challenge.salt, "correct");
        let wrong = hash_password(&challenge.challenge, &challenge.salt, "wrong");
        assert!(challenge.verify("correct", &right));
        assert!(!challenge.verify("correct", &wrong));
        assert!(!challenge.verify("correct", ""));
    }
}
