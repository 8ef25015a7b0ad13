//! Internal-mode password hashing (§4.3): a slow KDF, since the
//! workspace's `sha2` dependency alone is unsuitable for password
//! storage.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use meridian_core::Error;

/// Hash `password`, returning the PHC-formatted string (itself
/// base64-of-hash internally, per the Argon2 PHC string format) that is
/// what gets stored/sent, never the plaintext.
pub fn hash_password(password: &str, salt: &SaltString) -> Result<String, Error> {
    Argon2::default()
        .hash_password(password.as_bytes(), salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Authentication(format!("password hashing failed: {e}")))
}

/// Generate a fresh random salt for `hash_password`.
pub fn generate_salt() -> SaltString {
    SaltString::generate(&mut OsRng)
}

/// Verify `password` against a previously stored PHC hash string.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, Error> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| Error::Authentication(format!("malformed stored password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
