use argon2::{
    password_hash::{rand_core::OsRng, Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{AppError, Result};

/// Hash a password into an Argon2id PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Crypto(format!("failed to hash password: {e}")))
}

/// Ok when `password` matches the stored hash. A mismatch is `Unauthorized`;
/// a stored value that is not a PHC string is an internal error.
pub fn verify_password(password: &str, stored: &str) -> Result<()> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| AppError::Crypto(format!("stored password hash is unreadable: {e}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|err| match err {
            PasswordHashError::Password => AppError::Unauthorized("Invalid username/password".to_string()),
            other => AppError::Crypto(format!("password verification failed: {other}")),
        })
}
