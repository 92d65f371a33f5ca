use lazy_static::lazy_static;
use regex::Regex;
use time::{Date, OffsetDateTime};

use crate::error::{AppError, AppResult};

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 128;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trims and lower-cases an email, rejecting malformed addresses.
pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::InvalidInput("Invalid email address".into()));
    }
    Ok(email)
}

pub fn validate_password(password: &str) -> AppResult<()> {
    let len = password.chars().count();
    if len < PASSWORD_MIN_LEN {
        return Err(AppError::InvalidInput(format!(
            "Password must be at least {} characters",
            PASSWORD_MIN_LEN
        )));
    }
    if len > PASSWORD_MAX_LEN {
        return Err(AppError::InvalidInput(format!(
            "Password must be at most {} characters",
            PASSWORD_MAX_LEN
        )));
    }
    Ok(())
}

/// Trimmed, non-empty text field.
pub fn required_text(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidInput(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

pub fn validate_birth_date(birth_date: Date, now: OffsetDateTime) -> AppResult<()> {
    if birth_date >= now.date() {
        return Err(AppError::InvalidInput(
            "Birth date must be in the past".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM ").unwrap(), "jane.doe@example.com");
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("a b@x.com").is_err());
    }

    #[test]
    fn password_length_bounds() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("long-enough").is_ok());
        assert!(validate_password(&"x".repeat(PASSWORD_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn required_text_trims() {
        assert_eq!(required_text("name", "  Ada ").unwrap(), "Ada");
        assert!(required_text("name", "   ").is_err());
    }

    #[test]
    fn birth_date_must_be_past() {
        let now = datetime!(2025-01-10 12:00 UTC);
        assert!(validate_birth_date(date!(1990 - 05 - 01), now).is_ok());
        assert!(validate_birth_date(date!(2025 - 01 - 10), now).is_err());
    }
}
