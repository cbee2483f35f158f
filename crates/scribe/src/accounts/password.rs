//! Argon2id password hashing.

use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::RngCore;
use scribe_common::ScribeError;

/// Hashes and verifies passwords as PHC strings
#[derive(Default)]
pub struct PasswordHashing {
    argon2: Argon2<'static>,
}

impl PasswordHashing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a plaintext password with a fresh 16-byte salt
    pub fn hash(&self, password: &str) -> Result<String, ScribeError> {
        let mut salt_bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut salt_bytes);

        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| ScribeError::Internal(format!("salt encoding failed: {}", e)))?;

        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ScribeError::Internal(format!("password hashing failed: {}", e)))
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// An unparseable hash verifies as false.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash is malformed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashing = PasswordHashing::new();
        let hash = hashing.hash("pw12345").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("pw12345"));
        assert!(hashing.verify("pw12345", &hash));
        assert!(!hashing.verify("pw12346", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let hashing = PasswordHashing::new();
        let a = hashing.hash("same").unwrap();
        let b = hashing.hash("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_rejected() {
        assert!(!PasswordHashing::new().verify("pw", "not-a-phc-string"));
    }
}
