//! Argon2id password hashing for user records.

use crate::error::{RectusError, RectusResult, ValidationError};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use rand::RngCore;

const SALT_LEN: usize = 16;

/// Hashes `password` into a PHC string with a random salt.
pub fn hash_password(password: &str) -> RectusResult<String> {
    if password.is_empty() {
        return Err(ValidationError::InvalidPayload("password must not be empty".to_string()).into());
    }
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt)
        .map_err(|e| RectusError::storage(format!("Salt encoding failed: {}", e)))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| RectusError::storage(format!("Password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Checks `password` against a PHC string produced by [`hash_password`].
pub fn verify_password(password: &str, phc: &str) -> RectusResult<bool> {
    let parsed = PasswordHash::new(phc)
        .map_err(|e| RectusError::storage(format!("Invalid password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
