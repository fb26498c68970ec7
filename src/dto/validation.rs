//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_USERNAME_LEN: usize = 24;

/// Validates that a username is 1 to 24 characters of `[A-Za-z0-9_-]`.
///
/// # Examples
///
/// ```ignore
/// validate_username("alice_01") // Ok
/// validate_username("")         // Err - empty
/// validate_username("al ice")   // Err - space
/// ```
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        let mut err = ValidationError::new("username_length");
        err.message = Some(
            format!(
                "Username must be 1 to {MAX_USERNAME_LEN} characters (got {})",
                username.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        let mut err = ValidationError::new("username_format");
        err.message =
            Some("Username may only contain letters, digits, '_' and '-'".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a room join code: uppercase letters and digits.
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only uppercase letters and digits".into());
        return Err(err);
    }
    Ok(())
}
