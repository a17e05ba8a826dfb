//! Field validation shared by the entity constructors

use chrono::NaiveDate;

/// Rejection of a single input field, raised before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} field is required.")]
    Required(&'static str),

    #[error("{field} cannot exceed {max} characters.")]
    TooLong { field: &'static str, max: usize },

    #[error("Enter a valid email address.")]
    InvalidEmail,

    #[error("{0} cannot be in the future.")]
    DateInFuture(&'static str),

    #[error("End date cannot be before the start date.")]
    EndBeforeStart,

    #[error("Invalid {field}: {value}")]
    InvalidChoice { field: &'static str, value: String },

    #[error("{0}")]
    Password(String),
}

/// Require a non-blank value of at most `max` characters.
///
/// The value is returned unchanged; whitespace only matters for the blank check.
pub fn require_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    check_length(field, value, max)
}

pub fn check_length(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Validate a start/end date pair against `today`.
pub fn check_date_range(
    start: NaiveDate,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(), ValidationError> {
    if start > today {
        return Err(ValidationError::DateInFuture("Start date"));
    }
    if let Some(end) = end {
        if end < start {
            return Err(ValidationError::EndBeforeStart);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text_rejects_whitespace() {
        assert_eq!(
            require_text("Title", "  \n\t", 10),
            Err(ValidationError::Required("Title"))
        );
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        // four multi-byte characters
        assert!(check_length("Text", "éééé", 4).is_ok());
        assert!(check_length("Text", "ééééé", 4).is_err());
    }

    #[test]
    fn test_date_range() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let past = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let future = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();

        assert!(check_date_range(past, None, today).is_ok());
        assert!(check_date_range(past, Some(today), today).is_ok());
        assert!(check_date_range(past, Some(past), today).is_ok());
        assert_eq!(
            check_date_range(future, None, today),
            Err(ValidationError::DateInFuture("Start date"))
        );
        assert_eq!(
            check_date_range(today, Some(past), today),
            Err(ValidationError::EndBeforeStart)
        );
    }

    #[test]
    fn test_messages_read_naturally() {
        assert_eq!(
            ValidationError::Required("Comment").to_string(),
            "Comment field is required."
        );
        assert_eq!(
            ValidationError::TooLong { field: "Title", max: 256 }.to_string(),
            "Title cannot exceed 256 characters."
        );
    }
}
