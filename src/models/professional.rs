//! Professional profiles and their credentials

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::validation::{check_date_range, require_text, ValidationError};

pub const CREDENTIAL_FIELD_MAX: usize = 100;

/// One-to-one extension of a user holding their professional flair.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProfessionalUser {
    pub id: i64,
    pub user_id: i64,
    pub flair: String,
}

pub fn validate_flair(flair: &str) -> Result<(), ValidationError> {
    require_text("Flair", flair, CREDENTIAL_FIELD_MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Education {
    pub id: i64,
    pub professional_id: i64,
    pub school_name: String,
    pub degree: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Employment {
    pub id: i64,
    pub professional_id: i64,
    pub company: String,
    pub position: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// Education entry submitted from the dashboard. `id` selects an existing
/// entry to update; `None` creates a new one.
#[derive(Debug, Clone, Deserialize)]
pub struct EducationInput {
    pub id: Option<i64>,
    pub school_name: String,
    pub degree: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl EducationInput {
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationError> {
        require_text("School name", &self.school_name, CREDENTIAL_FIELD_MAX)?;
        require_text("Degree", &self.degree, CREDENTIAL_FIELD_MAX)?;
        check_date_range(self.start_date, self.end_date, today)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmploymentInput {
    pub id: Option<i64>,
    pub company: String,
    pub position: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl EmploymentInput {
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationError> {
        require_text("Company name", &self.company, CREDENTIAL_FIELD_MAX)?;
        require_text("Position", &self.position, CREDENTIAL_FIELD_MAX)?;
        check_date_range(self.start_date, self.end_date, today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_flair_bounds() {
        assert!(validate_flair("Solicitor").is_ok());
        assert_eq!(validate_flair(""), Err(ValidationError::Required("Flair")));
        assert!(validate_flair(&"x".repeat(101)).is_err());
        assert!(validate_flair(&"x".repeat(100)).is_ok());
    }

    #[test]
    fn test_education_validation() {
        let today = date(2024, 6, 1);
        let mut input = EducationInput {
            id: None,
            school_name: "Newcastle University".into(),
            degree: "LLB".into(),
            start_date: date(2018, 9, 1),
            end_date: Some(date(2021, 6, 30)),
        };
        assert!(input.validate(today).is_ok());

        input.degree = String::new();
        assert_eq!(input.validate(today), Err(ValidationError::Required("Degree")));

        input.degree = "LLB".into();
        input.end_date = Some(date(2017, 1, 1));
        assert_eq!(input.validate(today), Err(ValidationError::EndBeforeStart));
    }

    #[test]
    fn test_employment_start_in_future_rejected() {
        let input = EmploymentInput {
            id: None,
            company: "Acme Legal".into(),
            position: "Paralegal".into(),
            start_date: date(2030, 1, 1),
            end_date: None,
        };
        assert_eq!(
            input.validate(date(2024, 1, 1)),
            Err(ValidationError::DateInFuture("Start date"))
        );
    }
}
