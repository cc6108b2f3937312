//! Credential hashing and verification.
//!
//! Argon2id with default parameters; stored hashes are PHC strings that
//! carry their own salt and parameters, so verification needs no extra
//! state. Login treats an unknown user and a failed verification the
//! same way to keep the two cases indistinguishable to a caller.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::errors::{Result, RewardEngineError};

/// Hash a password into a PHC-formatted Argon2id string.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| RewardEngineError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a stored PHC hash string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| RewardEngineError::Internal(format!("Invalid stored password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify_round_trip() {
        let hash = hash_password("s3cret-enough").unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret-enough", &hash).unwrap());
        assert!(!verify_password("s3cret-wrong", &hash).unwrap());
    }

    #[test]
    fn test_same_password_hashes_differently() {
        let hash1 = hash_password("same-password").unwrap();
        let hash2 = hash_password("same-password").unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_password("same-password", &hash1).unwrap());
        assert!(verify_password("same-password", &hash2).unwrap());
    }

    #[test]
    fn test_malformed_stored_hash_is_error() {
        assert!(verify_password("password", "plaintext-migrated-badly").is_err());
    }
}
