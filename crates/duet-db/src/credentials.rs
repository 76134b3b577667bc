use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use rand_core::OsRng;

use crate::StoreError;

/// Digest and salt as stored in the `users` table.
pub struct Credentials {
    pub digest: String,
    pub salt: String,
}

/// Hash a password with a fresh random salt (Argon2id, PHC string output).
pub fn hash_password(password: &str) -> Result<Credentials, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    let digest = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| StoreError::Credentials(e.to_string()))?
        .to_string();

    Ok(Credentials {
        digest,
        salt: salt.as_str().to_string(),
    })
}

/// Recompute the digest of `password` with the stored salt and compare.
///
/// The comparison inside `verify_password` is constant-time. A digest whose
/// embedded salt disagrees with the salt column never verifies.
pub fn verify_password(password: &str, digest: &str, salt: &str) -> Result<bool, StoreError> {
    let parsed = PasswordHash::new(digest).map_err(|e| StoreError::Credentials(e.to_string()))?;

    if parsed.salt.as_ref().map(|s| s.as_str()) != Some(salt) {
        return Ok(false);
    }

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
