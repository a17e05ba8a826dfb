//! Professional credentials and the account dashboard

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::db::repositories::ProfessionalRepository;
use crate::models::{
    validate_flair, Education, EducationInput, Employment, EmploymentInput, ProfessionalUser,
    User,
};
use crate::services::user::UserServiceError;

/// A professional profile with its credentials
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub profile: ProfessionalUser,
    pub educations: Vec<Education>,
    pub employments: Vec<Employment>,
}

/// Everything the dashboard shows about the signed-in user
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub user: User,
    pub professional: Option<Credentials>,
}

pub struct ProfessionalService {
    repo: Arc<dyn ProfessionalRepository>,
}

impl ProfessionalService {
    pub fn new(repo: Arc<dyn ProfessionalRepository>) -> Self {
        Self { repo }
    }

    pub async fn dashboard(&self, user: &User) -> Result<Dashboard, UserServiceError> {
        Ok(Dashboard {
            user: user.clone(),
            professional: self.credentials(user.id).await?,
        })
    }

    pub async fn credentials(&self, user_id: i64) -> Result<Option<Credentials>, UserServiceError> {
        let profile = match self
            .repo
            .get_by_user(user_id)
            .await
            .context("Failed to get professional profile")?
        {
            Some(profile) => profile,
            None => return Ok(None),
        };

        let educations = self
            .repo
            .list_educations(profile.id)
            .await
            .context("Failed to list educations")?;
        let employments = self
            .repo
            .list_employments(profile.id)
            .await
            .context("Failed to list employments")?;

        Ok(Some(Credentials {
            profile,
            educations,
            employments,
        }))
    }

    /// Public flair of a user, if they have a professional profile
    pub async fn flair(&self, user_id: i64) -> Result<Option<String>, UserServiceError> {
        Ok(self
            .repo
            .get_by_user(user_id)
            .await
            .context("Failed to get professional profile")?
            .map(|p| p.flair))
    }

    /// Set the flair, creating the professional profile when missing
    pub async fn update_flair(
        &self,
        user: &User,
        flair: &str,
    ) -> Result<ProfessionalUser, UserServiceError> {
        validate_flair(flair)?;

        let existing = self
            .repo
            .get_by_user(user.id)
            .await
            .context("Failed to get professional profile")?;

        let profile = match existing {
            Some(mut profile) => {
                self.repo
                    .update_flair(profile.id, flair)
                    .await
                    .context("Failed to update flair")?;
                profile.flair = flair.to_string();
                profile
            }
            None => self
                .repo
                .create(user.id, flair)
                .await
                .context("Failed to create professional profile")?,
        };
        Ok(profile)
    }

    /// Create an education entry, or update the one named by `input.id`.
    pub async fn save_education(
        &self,
        user: &User,
        input: EducationInput,
    ) -> Result<i64, UserServiceError> {
        self.save_education_on(user, input, today()).await
    }

    async fn save_education_on(
        &self,
        user: &User,
        input: EducationInput,
        today: NaiveDate,
    ) -> Result<i64, UserServiceError> {
        let profile = self.require_profile(user).await?;
        input.validate(today)?;

        match input.id {
            Some(id) => {
                let updated = self
                    .repo
                    .update_education(profile.id, id, &input)
                    .await
                    .context("Failed to update education")?;
                if !updated {
                    return Err(UserServiceError::NotFound(format!("education {}", id)));
                }
                Ok(id)
            }
            None => Ok(self
                .repo
                .insert_education(profile.id, &input)
                .await
                .context("Failed to add education")?),
        }
    }

    /// Create an employment entry, or update the one named by `input.id`.
    pub async fn save_employment(
        &self,
        user: &User,
        input: EmploymentInput,
    ) -> Result<i64, UserServiceError> {
        self.save_employment_on(user, input, today()).await
    }

    async fn save_employment_on(
        &self,
        user: &User,
        input: EmploymentInput,
        today: NaiveDate,
    ) -> Result<i64, UserServiceError> {
        let profile = self.require_profile(user).await?;
        input.validate(today)?;

        match input.id {
            Some(id) => {
                let updated = self
                    .repo
                    .update_employment(profile.id, id, &input)
                    .await
                    .context("Failed to update employment")?;
                if !updated {
                    return Err(UserServiceError::NotFound(format!("employment {}", id)));
                }
                Ok(id)
            }
            None => Ok(self
                .repo
                .insert_employment(profile.id, &input)
                .await
                .context("Failed to add employment")?),
        }
    }

    async fn require_profile(&self, user: &User) -> Result<ProfessionalUser, UserServiceError> {
        self.repo
            .get_by_user(user.id)
            .await
            .context("Failed to get professional profile")?
            .ok_or_else(|| {
                UserServiceError::Forbidden("Only professional users have credentials".to_string())
            })
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
