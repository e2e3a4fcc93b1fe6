//! One-way hashing and verification for stored passwords.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password does not match")]
    Mismatch,
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Argon2id hasher with a fresh random salt per hash and the library's default cost.
#[derive(Debug, Clone, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    pub fn new() -> Self {
        Self
    }

    /// Hashes `plaintext` into a PHC-format string. Two calls with the same input differ.
    pub fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// Checks `plaintext` against a stored hash.
    ///
    /// A stored value that is not a valid PHC string can never match, so it is reported
    /// as a mismatch rather than an internal failure.
    pub fn verify(&self, hash: &str, plaintext: &str) -> Result<(), PasswordError> {
        let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::Mismatch)?;

        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(argon2::password_hash::Error::Password) => Err(PasswordError::Mismatch),
            Err(e) => Err(PasswordError::Hash(e.to_string())),
        }
    }
}
