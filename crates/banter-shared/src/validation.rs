//! User-input validation, mirrored from the server's schema.
//!
//! The rules and their messages match the server verbatim so the client can
//! reject bad input before a round trip without ever disagreeing with the
//! server's verdict. Checks run in schema order and stop at the first
//! failure, which is why a short password reports its length before its
//! missing character classes.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// A rejected field, carrying the exact message the server would produce.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid pattern"));
static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z ]+$").expect("valid pattern"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._]+$").expect("valid pattern"));
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid pattern"));
static URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:\S+$").expect("valid pattern"));
static EMAIL_TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@[^\s@]+(\.[^\s@]+)*$").expect("valid pattern"));

/// Leading and trailing whitespace is not the user's fault; trimmed before
/// any other check, as the server does.
pub fn validate_email(input: &str) -> Result<(), FieldError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(FieldError {
            field: "email",
            message: "Email is required",
        });
    }
    if !EMAIL_RE.is_match(value) {
        return Err(FieldError {
            field: "email",
            message: "Invalid email format",
        });
    }
    Ok(())
}

/// Minimum 8 characters, then one of each: lowercase, uppercase, digit and a
/// special from `!@#$%^&*`.
pub fn validate_password(input: &str) -> Result<(), FieldError> {
    if input.is_empty() {
        return Err(FieldError {
            field: "password",
            message: "Password is required",
        });
    }
    if input.chars().count() < 8 {
        return Err(FieldError {
            field: "password",
            message: "Password must be at least 8 characters long",
        });
    }
    let has_lower = input.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = input.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = input.chars().any(|c| c.is_ascii_digit());
    let has_special = input.chars().any(|c| "!@#$%^&*".contains(c));
    if !(has_lower && has_upper && has_digit && has_special) {
        return Err(FieldError {
            field: "password",
            message: "Password must include at least one lowercase letter, one uppercase letter, one digit, and one special character",
        });
    }
    Ok(())
}

pub fn validate_name(input: &str) -> Result<(), FieldError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(FieldError {
            field: "name",
            message: "Name is required",
        });
    }
    let len = value.chars().count();
    if len < 3 {
        return Err(FieldError {
            field: "name",
            message: "Name must be at least 3 characters long",
        });
    }
    if len > 30 {
        return Err(FieldError {
            field: "name",
            message: "Name must be less than 30 characters long",
        });
    }
    if !NAME_RE.is_match(value) {
        return Err(FieldError {
            field: "name",
            message: "Name can only contain letters and spaces",
        });
    }
    Ok(())
}

pub fn validate_tag(input: &str) -> Result<(), FieldError> {
    if input.is_empty() {
        return Err(FieldError {
            field: "tag",
            message: "Tag is required",
        });
    }
    let len = input.chars().count();
    if len < 3 {
        return Err(FieldError {
            field: "tag",
            message: "Tag must be at least 3 characters long",
        });
    }
    if len > 30 {
        return Err(FieldError {
            field: "tag",
            message: "Tag must be less than 30 characters long",
        });
    }
    if !TAG_RE.is_match(input) {
        return Err(FieldError {
            field: "tag",
            message: "Tag can only contain letters, numbers, and underscores",
        });
    }
    Ok(())
}

/// Exactly six digits.
pub fn validate_verification_code(input: &str) -> Result<(), FieldError> {
    if input.is_empty() {
        return Err(FieldError {
            field: "verificationCode",
            message: "Verification code cannot be empty",
        });
    }
    if input.chars().count() != 6 {
        return Err(FieldError {
            field: "verificationCode",
            message: "Verification code must be 6 characters long",
        });
    }
    if !DIGITS_RE.is_match(input) {
        return Err(FieldError {
            field: "verificationCode",
            message: "Verification code must contain only digits",
        });
    }
    Ok(())
}

/// Optional field; an empty value passes.
pub fn validate_phone(input: &str) -> Result<(), FieldError> {
    if input.is_empty() {
        return Ok(());
    }
    let len = input.chars().count();
    if len < 10 {
        return Err(FieldError {
            field: "phone",
            message: "Phone number must be at least 10 characters long",
        });
    }
    if len > 15 {
        return Err(FieldError {
            field: "phone",
            message: "Phone number must be less than 15 characters long",
        });
    }
    Ok(())
}

/// Optional field; an empty value passes, anything else must be an absolute
/// URI.
pub fn validate_avatar_url(input: &str) -> Result<(), FieldError> {
    if input.is_empty() {
        return Ok(());
    }
    if !URI_RE.is_match(input) {
        return Err(FieldError {
            field: "pfpUrl",
            message: "Avatar URL must be a valid URI",
        });
    }
    Ok(())
}

/// Templates look like `@domain` or `@domain.tld`, with further dotted
/// segments allowed.
pub fn validate_email_template(input: &str) -> Result<(), FieldError> {
    if input.is_empty() {
        return Err(FieldError {
            field: "emailTemplate",
            message: "Email template cannot be empty",
        });
    }
    if !EMAIL_TEMPLATE_RE.is_match(input) {
        return Err(FieldError {
            field: "emailTemplate",
            message: "Invalid email template format",
        });
    }
    Ok(())
}

/// Validate each template of a workspace's list; the first bad item fails
/// the batch.
pub fn validate_email_templates(templates: &[String]) -> Result<(), FieldError> {
    for template in templates {
        validate_email_template(template)?;
    }
    Ok(())
}
