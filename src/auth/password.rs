//! Password hashing and verification using Argon2
//!
//! Uses argon2id variant with recommended parameters for password hashing.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::WeblogError;

/// Hash a password using Argon2id
///
/// Returns the PHC-formatted hash string that includes the salt and parameters.
pub fn hash_password(password: &str) -> Result<String, WeblogError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| WeblogError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
///
/// Returns true if the password matches the hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, WeblogError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| WeblogError::Internal(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Check the password policy used for registration, change and reset:
/// 3-32 characters of letters, digits or `_`, with at least one letter and one digit.
pub fn validate_password_policy(password: &str) -> Result<(), WeblogError> {
    let len = password.chars().count();
    if !(3..=32).contains(&len) {
        return Err(WeblogError::ValidationFailed(
            "password must be 3-32 characters".into(),
        ));
    }
    if !password.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(WeblogError::ValidationFailed(
            "password may only contain letters, digits and underscores".into(),
        ));
    }
    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_letter = password.chars().any(|c| c.is_alphabetic());
    if !has_digit || !has_letter {
        return Err(WeblogError::ValidationFailed(
            "password must contain both letters and digits".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let password = "correct_horse_42";
        let hash = hash_password(password).unwrap();

        assert!(hash.starts_with("$argon2"));
        assert!(!hash.contains(password));

        assert!(verify_password(password, &hash).unwrap());
        assert!(!verify_password("wrong_horse_42", &hash).unwrap());
    }

    #[test]
    fn test_different_salts() {
        let password = "same1";
        let hash1 = hash_password(password).unwrap();
        let hash2 = hash_password(password).unwrap();

        assert_ne!(hash1, hash2);
        assert!(verify_password(password, &hash1).unwrap());
        assert!(verify_password(password, &hash2).unwrap());
    }

    #[test]
    fn test_invalid_hash_format() {
        let result = verify_password("password", "not-a-valid-hash");
        assert!(result.is_err());
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password_policy("abc123").is_ok());
        assert!(validate_password_policy("a_1").is_ok());
        assert!(validate_password_policy("ab").is_err());
        assert!(validate_password_policy("abcdef").is_err());
        assert!(validate_password_policy("123456").is_err());
        assert!(validate_password_policy("abc 123").is_err());
        assert!(validate_password_policy("abc-123").is_err());
        assert!(validate_password_policy(&"a1".repeat(17)).is_err());
    }
}
