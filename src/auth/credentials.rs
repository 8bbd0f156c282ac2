//! Sign-in and registration form checks.
//!
//! These run before any request reaches the provider. The provider stays
//! authoritative for email format and account uniqueness.

use super::types::AuthError;

pub const MIN_PASSWORD_LEN: usize = 6;
const STRONG_PASSWORD_LEN: usize = 8;

pub const MSG_FILL_ALL_FIELDS: &str = "Please fill in all fields";
pub const MSG_PASSWORDS_DIFFER: &str = "Passwords do not match";
pub const MSG_PASSWORD_TOO_SHORT: &str = "Password must be at least 6 characters";

/// Both fields present.
///
/// # Errors
///
/// Returns [`AuthError::Validation`] when either field is empty.
pub fn validate_sign_in(email: &str, password: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AuthError::Validation(MSG_FILL_ALL_FIELDS.into()));
    }
    Ok(())
}

/// All fields present, confirmation matching, minimum length met.
///
/// # Errors
///
/// Returns [`AuthError::Validation`] with the first failing rule's message.
pub fn validate_registration(email: &str, password: &str, confirm: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() || password.is_empty() || confirm.is_empty() {
        return Err(AuthError::Validation(MSG_FILL_ALL_FIELDS.into()));
    }
    if password != confirm {
        return Err(AuthError::Validation(MSG_PASSWORDS_DIFFER.into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(MSG_PASSWORD_TOO_SHORT.into()));
    }
    Ok(())
}

/// Coarse password strength shown next to the registration form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PasswordStrength {
    Empty,
    Weak,
    Fair,
    Good,
    Strong,
}

impl PasswordStrength {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::Weak => "Weak",
            Self::Fair => "Fair",
            Self::Good => "Good",
            Self::Strong => "Strong",
        }
    }
}

#[must_use]
pub fn password_strength(password: &str) -> PasswordStrength {
    let len = password.chars().count();
    if len == 0 {
        return PasswordStrength::Empty;
    }
    if len < MIN_PASSWORD_LEN {
        return PasswordStrength::Weak;
    }
    if len < STRONG_PASSWORD_LEN {
        return PasswordStrength::Fair;
    }
    let mixed = password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit());
    if mixed { PasswordStrength::Strong } else { PasswordStrength::Good }
}

#[cfg(test)]
#[path = "credentials_test.rs"]
mod tests;
