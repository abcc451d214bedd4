//! Input validation for credentials and SQL identifiers.

use std::fmt;

/// Validation error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Empty value where one is required.
    Empty(String),
    /// Value too short.
    TooShort { field: String, min: usize, actual: usize },
    /// Value too long.
    TooLong { field: String, max: usize, actual: usize },
    /// Value contains characters outside the allowed set.
    InvalidCharacters { field: String, allowed: &'static str },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Empty(field) => write!(f, "{} cannot be empty", field),
            ValidationError::TooShort { field, min, actual } => {
                write!(f, "{} is too short ({} chars, min {})", field, actual, min)
            }
            ValidationError::TooLong { field, max, actual } => {
                write!(f, "{} is too long ({} chars, max {})", field, actual, max)
            }
            ValidationError::InvalidCharacters { field, allowed } => {
                write!(f, "{} may only contain {}", field, allowed)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Minimum allowed length for usernames.
pub const MIN_USERNAME_LENGTH: usize = 3;

/// Maximum allowed length for usernames.
pub const MAX_USERNAME_LENGTH: usize = 32;

/// Maximum allowed length for passwords.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Maximum allowed length for SQL identifiers.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Trim and lower-case a username. Lookups and storage both use this form.
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Validate an already-normalised username.
///
/// Usernames are 3 to 32 characters of `a-z`, `0-9`, `_`, `.` or `-`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::Empty("username".to_string()));
    }

    let len = username.chars().count();
    if len < MIN_USERNAME_LENGTH {
        return Err(ValidationError::TooShort {
            field: "username".to_string(),
            min: MIN_USERNAME_LENGTH,
            actual: len,
        });
    }
    if len > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: MAX_USERNAME_LENGTH,
            actual: len,
        });
    }

    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-');
    if !username.chars().all(allowed) {
        return Err(ValidationError::InvalidCharacters {
            field: "username".to_string(),
            allowed: "lowercase letters, digits, '_', '.' and '-'",
        });
    }

    Ok(())
}

/// Validate a password. Only presence and an upper bound are enforced.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Empty("password".to_string()));
    }

    let len = password.chars().count();
    if len > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong {
            field: "password".to_string(),
            max: MAX_PASSWORD_LENGTH,
            actual: len,
        });
    }

    Ok(())
}

/// Validate a bare SQL identifier such as a table name.
///
/// Identifiers are interpolated into statements, so only
/// `[A-Za-z_][A-Za-z0-9_]*` is accepted.
pub fn validate_identifier(identifier: &str) -> Result<(), ValidationError> {
    if identifier.is_empty() {
        return Err(ValidationError::Empty("identifier".to_string()));
    }

    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::TooLong {
            field: "identifier".to_string(),
            max: MAX_IDENTIFIER_LENGTH,
            actual: identifier.len(),
        });
    }

    let mut chars = identifier.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidCharacters {
            field: "identifier".to_string(),
            allowed: "ASCII letters, digits and '_' (not starting with a digit)",
        });
    }

    Ok(())
}
