//! Password hashing and complexity policy
//!
//! Hashes are Argon2 PHC strings. Complexity requirements come from the
//! tenant-resolved `PASSWORD_*` policy settings; see
//! [`PolicyCache::password_policy`](super::policy::PolicyCache::password_policy).

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::{Deserialize, Serialize};
use testshaper_core::{Error, Result};

/// Minimum password length when no policy overrides it
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Characters that satisfy the special-character requirement
pub const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Password policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    /// Minimum password length in characters
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    /// Require an ASCII digit
    pub require_digit: bool,
    /// Require one of [`SPECIAL_CHARS`]
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

/// Result of password validation with details about failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Validate a password against a policy
pub fn validate_password_with_policy(password: &str, policy: &PasswordPolicy) -> Result<()> {
    let result = check_password_strength(password, policy);

    if result.is_valid {
        Ok(())
    } else {
        Err(Error::WeakPassword(result.errors.join("; ")))
    }
}

/// Check password strength and return every unmet requirement
pub fn check_password_strength(password: &str, policy: &PasswordPolicy) -> PasswordValidationResult {
    let mut errors = Vec::new();
    let length = password.chars().count();

    if length < policy.min_length {
        errors.push(format!(
            "Password must be at least {} characters long",
            policy.min_length
        ));
    }

    if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter".to_string());
    }

    if policy.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must contain at least one lowercase letter".to_string());
    }

    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number".to_string());
    }

    if policy.require_special && !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        errors.push("Password must contain at least one special character".to_string());
    }

    PasswordValidationResult {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Hash password using Argon2
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Internal(format!("Failed to hash password: {}", e)))?
        .to_string();

    Ok(password_hash)
}

/// Verify a password against a stored PHC hash.
///
/// A hash that cannot be parsed verifies as `false`; it can never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_passwords() {
        let policy = PasswordPolicy::default();
        assert!(validate_password_with_policy("Secure1!", &policy).is_ok());
        assert!(validate_password_with_policy("MyP@ssw0rd2024", &policy).is_ok());
    }

    #[test]
    fn test_too_short() {
        let err = validate_password_with_policy("Sh0rt!", &PasswordPolicy::default())
            .unwrap_err()
            .to_string();
        assert!(err.contains("at least 8 characters"));
    }

    #[test]
    fn test_missing_classes() {
        let policy = PasswordPolicy::default();
        let err = |pw: &str| validate_password_with_policy(pw, &policy).unwrap_err().to_string();

        assert!(err("alllower1!").contains("uppercase letter"));
        assert!(err("ALLUPPER1!").contains("lowercase letter"));
        assert!(err("NoDigits!!").contains("number"));
        assert!(err("NoSpecial12").contains("special character"));
    }

    #[test]
    fn test_special_set_is_exact() {
        let policy = PasswordPolicy::default();
        // underscore and hyphen are not in the accepted set
        assert!(validate_password_with_policy("Abcdefg1_-", &policy).is_err());
        assert!(validate_password_with_policy("Abcdefg1\"", &policy).is_ok());
    }

    #[test]
    fn test_multiple_errors_reported_together() {
        let result = check_password_strength("weak", &PasswordPolicy::default());
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 4);
    }

    #[test]
    fn test_relaxed_policy() {
        let lenient = PasswordPolicy {
            min_length: 4,
            require_uppercase: false,
            require_lowercase: true,
            require_digit: false,
            require_special: false,
        };
        assert!(validate_password_with_policy("simple", &lenient).is_ok());
        assert!(validate_password_with_policy("simple", &PasswordPolicy::default()).is_err());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Correct1!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Correct1!", &hash));
        assert!(!verify_password("Wrong1!", &hash));
        assert!(!verify_password("Correct1!", "not-a-phc-string"));
    }
}
