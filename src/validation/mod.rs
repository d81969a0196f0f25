use std::fmt;

pub const TRANSACTION_ID_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_transaction_id(id: &str) -> ValidationResult {
    validate_required("id", id)?;
    validate_max_len("id", id, TRANSACTION_ID_MAX_LEN)?;

    if sanitize_string(id) != id {
        return Err(ValidationError::new(
            "id",
            "must not contain whitespace or control characters",
        ));
    }

    Ok(())
}

/// Processor timestamps are milliseconds since the epoch.
pub fn validate_timestamp(field: &str, millis: i64) -> ValidationResult {
    if millis < 0 {
        return Err(ValidationError::new(field, "must not be negative"));
    }

    Ok(())
}

pub fn validate_time_range(from: i64, to: i64) -> ValidationResult {
    validate_timestamp("from", from)?;
    validate_timestamp("to", to)?;

    if from > to {
        return Err(ValidationError::new("from", "must not be after 'to'"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_required_field() {
        assert!(validate_required("field", "value").is_ok());
        assert!(validate_required("field", "   ").is_err());
    }

    #[test]
    fn validates_max_len() {
        assert!(validate_max_len("field", "abc", 3).is_ok());
        assert!(validate_max_len("field", "abcd", 3).is_err());
    }

    #[test]
    fn sanitizes_string() {
        assert_eq!(sanitize_string("  hello\tworld  "), "hello world");
        assert_eq!(sanitize_string("single"), "single");
        assert_eq!(sanitize_string(" \n "), "");
        assert_eq!(sanitize_string("ab\u{0000}cd\u{0007}"), "ab cd");
        assert_eq!(sanitize_string("line\r\nbreak"), "line break");
    }

    #[test]
    fn validates_transaction_id() {
        assert!(validate_transaction_id("5305e3bab097f420a62ced0b").is_ok());
        assert!(validate_transaction_id("").is_err());
        assert!(validate_transaction_id(" tx1").is_err());
        assert!(validate_transaction_id("tx\u{0007}1").is_err());
        assert!(validate_transaction_id(&"a".repeat(256)).is_err());
    }

    #[test]
    fn validates_time_range() {
        assert!(validate_time_range(0, 0).is_ok());
        assert!(validate_time_range(1_000, 2_000).is_ok());
        assert!(validate_time_range(2_000, 1_000).is_err());

        let err = validate_time_range(-1, 1_000).unwrap_err();
        assert_eq!(err.field, "from");
    }

    #[test]
    fn error_displays_field_and_message() {
        let err = ValidationError::new("id", "must not be empty");
        assert_eq!(err.to_string(), "id: must not be empty");
    }
}
