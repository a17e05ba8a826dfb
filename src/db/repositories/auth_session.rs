//! Login session repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::on_pool;
use crate::db::DynDatabasePool;
use crate::models::AuthSession;

#[async_trait]
pub trait AuthSessionRepository: Send + Sync {
    async fn create(&self, session: &AuthSession) -> Result<AuthSession>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<AuthSession>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<i64>;
}

pub struct SqlxAuthSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxAuthSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AuthSessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AuthSessionRepository for SqlxAuthSessionRepository {
    async fn create(&self, session: &AuthSession) -> Result<AuthSession> {
        on_pool!(self.pool, p => {
            sqlx::query(
                "INSERT INTO auth_sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .bind(session.created_at)
            .execute(p)
            .await
            .map(|_| ())
        })
        .context("Failed to create session")?;

        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AuthSession>> {
        let session = on_pool!(self.pool, p => {
            sqlx::query_as::<_, AuthSession>(
                "SELECT id, user_id, expires_at, created_at FROM auth_sessions WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(p)
            .await
        })
        .context("Failed to get session by ID")?;
        Ok(session)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM auth_sessions WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .map(|_| ())
        })
        .context("Failed to delete session")?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM auth_sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(p)
                .await
                .map(|_| ())
        })
        .context("Failed to delete sessions by user")?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<i64> {
        let now = Utc::now();
        let deleted = on_pool!(self.pool, p => {
            sqlx::query("DELETE FROM auth_sessions WHERE expires_at < ?")
                .bind(now)
                .execute(p)
                .await
                .map(|r| r.rows_affected())
        })
        .context("Failed to delete expired sessions")?;
        Ok(deleted as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;
    use chrono::Duration;

    async fn setup() -> (Arc<dyn AuthSessionRepository>, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::boxed(pool.clone());
        let user = users
            .create(&User::new(
                "sam".into(),
                "Sam".into(),
                "Lee".into(),
                "sam@example.com".into(),
                "hash".into(),
            ))
            .await
            .unwrap();
        (SqlxAuthSessionRepository::boxed(pool), user.id)
    }

    fn session(id: &str, user_id: i64, expires_in: Duration) -> AuthSession {
        let now = Utc::now();
        AuthSession {
            id: id.to_string(),
            user_id,
            expires_at: now + expires_in,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let (repo, user_id) = setup().await;
        repo.create(&session("tok", user_id, Duration::days(1))).await.unwrap();

        let found = repo.get_by_id("tok").await.unwrap().unwrap();
        assert_eq!(found.user_id, user_id);
        assert!(!found.is_expired());

        repo.delete("tok").await.unwrap();
        assert!(repo.get_by_id("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_sessions() {
        let (repo, user_id) = setup().await;
        repo.create(&session("old", user_id, Duration::hours(-1))).await.unwrap();
        repo.create(&session("new", user_id, Duration::hours(1))).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id("old").await.unwrap().is_none());
        assert!(repo.get_by_id("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_by_user() {
        let (repo, user_id) = setup().await;
        repo.create(&session("a", user_id, Duration::days(1))).await.unwrap();
        repo.create(&session("b", user_id, Duration::days(1))).await.unwrap();

        repo.delete_by_user(user_id).await.unwrap();
        assert!(repo.get_by_id("a").await.unwrap().is_none());
        assert!(repo.get_by_id("b").await.unwrap().is_none());
    }
}
