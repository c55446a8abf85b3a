//! Password hashing provider.
//!
//! One handler fronts both supported schemes: Argon2 (default) and bcrypt
//! (legacy hashes). Verification dispatches on the stored hash's prefix, so
//! credentials hashed under either scheme keep verifying.

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use thiserror::Error;

/// Schemes accepted by `--mkpasswd` and the datastore.
pub const VALID_SCHEMES: &[&str] = &["argon2", "bcrypt"];

/// Scheme used when none is requested.
pub const DEFAULT_SCHEME: &str = "argon2";

#[derive(Debug, Error)]
pub enum HashError {
    #[error("unknown hashing scheme: {0}")]
    UnknownScheme(String),

    #[error("hashing failed: {0}")]
    Argon2(argon2::password_hash::Error),

    #[error("hashing failed: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}

/// The hashing provider handed to SASL and the CLI.
pub struct HashHandler {
    enabled: bool,
}

impl HashHandler {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// A provider with hashing unavailable; SASL PLAIN prunes itself when it
    /// sees one.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn valid_schemes(&self) -> &'static [&'static str] {
        VALID_SCHEMES
    }

    pub fn default_scheme(&self) -> &'static str {
        DEFAULT_SCHEME
    }

    /// Hash a password under the named scheme.
    pub fn encrypt(&self, password: &str, scheme: &str) -> Result<String, HashError> {
        match scheme {
            "argon2" => {
                let salt = SaltString::generate(&mut OsRng);
                Argon2::default()
                    .hash_password(password.as_bytes(), &salt)
                    .map(|hash| hash.to_string())
                    .map_err(HashError::Argon2)
            }
            "bcrypt" => Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?),
            other => Err(HashError::UnknownScheme(other.to_string())),
        }
    }

    /// Verify a password against a stored hash of either scheme.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        if hash.starts_with("$argon2") {
            PasswordHash::new(hash)
                .map(|parsed| {
                    Argon2::default()
                        .verify_password(password.as_bytes(), &parsed)
                        .is_ok()
                })
                .unwrap_or(false)
        } else if hash.starts_with("$2") {
            bcrypt::verify(password, hash).unwrap_or(false)
        } else {
            false
        }
    }
}

impl Default for HashHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2_round_trip() {
        let hashing = HashHandler::new();
        let hash = hashing.encrypt("hunter2", "argon2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(hashing.verify("hunter2", &hash));
        assert!(!hashing.verify("hunter3", &hash));
    }

    #[test]
    fn bcrypt_round_trip() {
        let hashing = HashHandler::new();
        let hash = hashing.encrypt("hunter2", "bcrypt").unwrap();
        assert!(hash.starts_with("$2"));
        assert!(hashing.verify("hunter2", &hash));
        assert!(!hashing.verify("hunter3", &hash));
    }

    #[test]
    fn unknown_scheme_and_garbage_hash() {
        let hashing = HashHandler::new();
        assert!(matches!(
            hashing.encrypt("x", "md5"),
            Err(HashError::UnknownScheme(_))
        ));
        assert!(!hashing.verify("x", "not-a-hash"));
    }
}
