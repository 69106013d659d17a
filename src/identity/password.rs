//! Password hashing and verification (Argon2id)
//!
//! Hashes are stored as PHC-format strings, e.g.
//! `$argon2id$v=19$m=19456,t=2,p=1$...`.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use super::IdentityError;

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| IdentityError::Hashing(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch and an error only for a malformed hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, IdentityError> {
    let parsed = PasswordHash::new(hash).map_err(|e| IdentityError::Hashing(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("corper123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("corper123", &hash).unwrap());
        assert!(!verify_password("corper124", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash() {
        assert!(matches!(
            verify_password("x", "not-a-hash"),
            Err(IdentityError::Hashing(_))
        ));
    }
}
