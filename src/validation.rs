//! Input checks shared by the command modules.
//!
//! Checks accumulate into [`Violations`] so a caller sees every bad field in
//! one response rather than fixing them one round-trip at a time.

use crate::error::{AppError, FieldError};

/// Length limits for validated fields.
pub mod limits {
    pub const MIN_NAME_LENGTH: usize = 2;
    pub const MIN_PHONE_LENGTH: usize = 6;
    pub const MAX_EMAIL_LENGTH: usize = 254;
}

#[derive(Debug, Default)]
pub struct Violations(Vec<FieldError>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was recorded, otherwise a validation error
    /// carrying every recorded field.
    pub fn finish(self) -> Result<(), AppError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.0))
        }
    }

    /// Trimmed, non-empty text of at least `min` characters.
    pub fn require_text(&mut self, field: &str, value: Option<&str>, min: usize) -> Option<String> {
        match trimmed(value) {
            None => {
                self.add(field, "is required");
                None
            }
            Some(v) if v.chars().count() < min => {
                self.add(field, format!("must be at least {min} characters"));
                None
            }
            Some(v) => Some(v),
        }
    }

    /// Optional email: blank is treated as absent, anything else must parse.
    pub fn optional_email(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        let email = trimmed(value)?;
        if is_valid_email(&email) {
            Some(email.to_lowercase())
        } else {
            self.add(field, "must be a valid email address");
            None
        }
    }

    pub fn non_negative(&mut self, field: &str, value: Option<f64>) -> Option<f64> {
        match value {
            None => {
                self.add(field, "is required");
                None
            }
            Some(v) if !v.is_finite() || v < 0.0 => {
                self.add(field, "must be a non-negative number");
                None
            }
            Some(v) => Some(v),
        }
    }
}

/// Trim and drop empty strings.
pub fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Structural check only: one `@`, non-empty local part, dotted domain, no
/// whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > limits::MAX_EMAIL_LENGTH || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}
