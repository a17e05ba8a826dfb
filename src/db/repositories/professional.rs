//! Professional profile repository
//!
//! Flair plus education and employment history of professional users.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;

use super::{on_pool, InsertId};
use crate::db::DynDatabasePool;
use crate::models::{Education, EducationInput, Employment, EmploymentInput, ProfessionalUser};

#[async_trait]
pub trait ProfessionalRepository: Send + Sync {
    async fn get_by_user(&self, user_id: i64) -> Result<Option<ProfessionalUser>>;

    async fn create(&self, user_id: i64, flair: &str) -> Result<ProfessionalUser>;

    async fn update_flair(&self, id: i64, flair: &str) -> Result<()>;

    async fn list_educations(&self, professional_id: i64) -> Result<Vec<Education>>;

    async fn list_employments(&self, professional_id: i64) -> Result<Vec<Employment>>;

    async fn insert_education(&self, professional_id: i64, input: &EducationInput) -> Result<i64>;

    /// Update an entry owned by `professional_id`; returns false when no such entry exists
    async fn update_education(&self, professional_id: i64, id: i64, input: &EducationInput)
        -> Result<bool>;

    async fn insert_employment(&self, professional_id: i64, input: &EmploymentInput)
        -> Result<i64>;

    async fn update_employment(
        &self,
        professional_id: i64,
        id: i64,
        input: &EmploymentInput,
    ) -> Result<bool>;
}

pub struct SqlxProfessionalRepository {
    pool: DynDatabasePool,
}

impl SqlxProfessionalRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ProfessionalRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ProfessionalRepository for SqlxProfessionalRepository {
    async fn get_by_user(&self, user_id: i64) -> Result<Option<ProfessionalUser>> {
        let professional = on_pool!(self.pool, p => {
            sqlx::query_as::<_, ProfessionalUser>(
                "SELECT id, user_id, flair FROM professionals WHERE user_id = ?",
            )
            .bind(user_id)
            .fetch_optional(p)
            .await
        })
        .context("Failed to get professional profile")?;
        Ok(professional)
    }

    async fn create(&self, user_id: i64, flair: &str) -> Result<ProfessionalUser> {
        let id = on_pool!(self.pool, p => {
            sqlx::query("INSERT INTO professionals (user_id, flair) VALUES (?, ?)")
                .bind(user_id)
                .bind(flair)
                .execute(p)
                .await
                .map(|r| r.insert_id())
        })
        .context("Failed to create professional profile")?;

        Ok(ProfessionalUser {
            id,
            user_id,
            flair: flair.to_string(),
        })
    }

    async fn update_flair(&self, id: i64, flair: &str) -> Result<()> {
        on_pool!(self.pool, p => {
            sqlx::query("UPDATE professionals SET flair = ? WHERE id = ?")
                .bind(flair)
                .bind(id)
                .execute(p)
                .await
                .map(|_| ())
        })
        .context("Failed to update flair")?;
        Ok(())
    }

    async fn list_educations(&self, professional_id: i64) -> Result<Vec<Education>> {
        let rows = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Education>(
                r#"
                SELECT id, professional_id, school_name, degree, start_date, end_date
                FROM educations
                WHERE professional_id = ?
                ORDER BY start_date DESC, id DESC
                "#,
            )
            .bind(professional_id)
            .fetch_all(p)
            .await
        })
        .context("Failed to list educations")?;
        Ok(rows)
    }

    async fn list_employments(&self, professional_id: i64) -> Result<Vec<Employment>> {
        let rows = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Employment>(
                r#"
                SELECT id, professional_id, company, position, start_date, end_date
                FROM employments
                WHERE professional_id = ?
                ORDER BY start_date DESC, id DESC
                "#,
            )
            .bind(professional_id)
            .fetch_all(p)
            .await
        })
        .context("Failed to list employments")?;
        Ok(rows)
    }

    async fn insert_education(&self, professional_id: i64, input: &EducationInput) -> Result<i64> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                r#"
                INSERT INTO educations (professional_id, school_name, degree, start_date, end_date)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(professional_id)
            .bind(&input.school_name)
            .bind(&input.degree)
            .bind(input.start_date)
            .bind(input.end_date)
            .execute(p)
            .await
            .map(|r| r.insert_id())
        })
        .context("Failed to insert education")?;
        Ok(id)
    }

    async fn update_education(
        &self,
        professional_id: i64,
        id: i64,
        input: &EducationInput,
    ) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query(
                r#"
                UPDATE educations
                SET school_name = ?, degree = ?, start_date = ?, end_date = ?
                WHERE id = ? AND professional_id = ?
                "#,
            )
            .bind(&input.school_name)
            .bind(&input.degree)
            .bind(input.start_date)
            .bind(input.end_date)
            .bind(id)
            .bind(professional_id)
            .execute(p)
            .await
            .map(|r| r.rows_affected())
        })
        .context("Failed to update education")?;
        Ok(affected > 0)
    }

    async fn insert_employment(
        &self,
        professional_id: i64,
        input: &EmploymentInput,
    ) -> Result<i64> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                r#"
                INSERT INTO employments (professional_id, company, position, start_date, end_date)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(professional_id)
            .bind(&input.company)
            .bind(&input.position)
            .bind(input.start_date)
            .bind(input.end_date)
            .execute(p)
            .await
            .map(|r| r.insert_id())
        })
        .context("Failed to insert employment")?;
        Ok(id)
    }

    async fn update_employment(
        &self,
        professional_id: i64,
        id: i64,
        input: &EmploymentInput,
    ) -> Result<bool> {
        let affected = on_pool!(self.pool, p => {
            sqlx::query(
                r#"
                UPDATE employments
                SET company = ?, position = ?, start_date = ?, end_date = ?
                WHERE id = ? AND professional_id = ?
                "#,
            )
            .bind(&input.company)
            .bind(&input.position)
            .bind(input.start_date)
            .bind(input.end_date)
            .bind(id)
            .bind(professional_id)
            .execute(p)
            .await
            .map(|r| r.rows_affected())
        })
        .context("Failed to update employment")?;
        Ok(affected > 0)
    }
}
