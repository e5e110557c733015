//! Field validation shared by domain records.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex")
});

/// Validation failure for a domain record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required text field is empty after trim.
    Blank { field: &'static str },
    /// Email does not look like `local@domain.tld`.
    InvalidEmail(String),
    /// Numeric or date field outside its accepted range.
    OutOfRange { field: &'static str, value: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank { field } => write!(f, "field `{field}` must not be blank"),
            Self::InvalidEmail(value) => write!(f, "invalid email address `{value}`"),
            Self::OutOfRange { field, value } => {
                write!(f, "field `{field}` out of range: {value}")
            }
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn require_non_blank(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Blank { field });
    }
    Ok(())
}

pub(crate) fn require_email(value: &str) -> Result<(), ValidationError> {
    if !EMAIL_RE.is_match(value.trim()) {
        return Err(ValidationError::InvalidEmail(value.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{require_email, require_non_blank, ValidationError};

    #[test]
    fn email_shape_is_checked() {
        assert!(require_email("reader@library.org").is_ok());
        assert!(require_email(" reader@library.org ").is_ok());
        assert_eq!(
            require_email("reader.library.org"),
            Err(ValidationError::InvalidEmail("reader.library.org".to_string()))
        );
        assert!(require_email("a@b").is_err());
    }

    #[test]
    fn blank_text_is_rejected() {
        assert_eq!(
            require_non_blank("name", "  \t"),
            Err(ValidationError::Blank { field: "name" })
        );
    }
}
