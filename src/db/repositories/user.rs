//! User repository
//!
//! Database operations for user accounts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{on_pool, InsertId};
use crate::db::DynDatabasePool;
use crate::models::User;

const USER_COLUMNS: &str = "id, username, first_name, last_name, email, password_hash, \
    description, role, is_active, is_banned, reason_banned, created_at, updated_at";

const INSERT_USER: &str = r#"
    INSERT INTO users (username, first_name, last_name, email, password_hash,
        description, role, is_active, is_banned, reason_banned, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user, returning it with its id
    async fn create(&self, user: &User) -> Result<User>;

    /// Insert a user together with a professional profile, both or neither
    async fn create_with_profile(&self, user: &User, flair: &str) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist every mutable field and bump `updated_at`
    async fn update(&self, user: &User) -> Result<User>;

    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn get_by_column(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let user = on_pool!(self.pool, p => {
            sqlx::query_as::<_, User>(&sql).bind(value).fetch_optional(p).await
        })
        .with_context(|| format!("Failed to get user by {}", column))?;
        Ok(user)
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(INSERT_USER)
                .bind(&user.username)
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.description)
                .bind(user.role.to_string())
                .bind(user.is_active)
                .bind(user.is_banned)
                .bind(&user.reason_banned)
                .bind(user.created_at)
                .bind(user.updated_at)
                .execute(p)
                .await
                .map(|r| r.insert_id())
        })
        .context("Failed to create user")?;

        let mut created = user.clone();
        created.id = id;
        Ok(created)
    }

    async fn create_with_profile(&self, user: &User, flair: &str) -> Result<User> {
        let id = on_pool!(self.pool, p => {
            let mut tx = p.begin().await.context("Failed to begin transaction")?;
            let id = sqlx::query(INSERT_USER)
                .bind(&user.username)
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.description)
                .bind(user.role.to_string())
                .bind(user.is_active)
                .bind(user.is_banned)
                .bind(&user.reason_banned)
                .bind(user.created_at)
                .bind(user.updated_at)
                .execute(&mut *tx)
                .await
                .context("Failed to create user")?
                .insert_id();
            sqlx::query("INSERT INTO professionals (user_id, flair) VALUES (?, ?)")
                .bind(id)
                .bind(flair)
                .execute(&mut *tx)
                .await
                .context("Failed to create professional profile")?;
            tx.commit().await.context("Failed to commit registration")?;
            id
        });

        let mut created = user.clone();
        created.id = id;
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let user = on_pool!(self.pool, p => {
            sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(p).await
        })
        .context("Failed to get user by ID")?;
        Ok(user)
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.get_by_column("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.get_by_column("email", email).await
    }

    async fn update(&self, user: &User) -> Result<User> {
        let sql = r#"
            UPDATE users
            SET first_name = ?, last_name = ?, email = ?, password_hash = ?, description = ?,
                role = ?, is_active = ?, is_banned = ?, reason_banned = ?, updated_at = ?
            WHERE id = ?
        "#;
        let now = Utc::now();
        on_pool!(self.pool, p => {
            sqlx::query(sql)
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(&user.description)
                .bind(user.role.to_string())
                .bind(user.is_active)
                .bind(user.is_banned)
                .bind(&user.reason_banned)
                .bind(now)
                .bind(user.id)
                .execute(p)
                .await
                .map(|_| ())
        })
        .context("Failed to update user")?;

        let mut updated = user.clone();
        updated.updated_at = now;
        Ok(updated)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = on_pool!(self.pool, p => {
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM users").fetch_one(p).await
        })
        .context("Failed to count users")?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserRole;

    async fn setup() -> Arc<dyn UserRepository> {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::boxed(pool)
    }

    fn new_user(username: &str) -> User {
        User::new(
            username.to_string(),
            "Test".to_string(),
            "User".to_string(),
            format!("{}@example.com", username),
            "hash".to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = setup().await;

        let created = repo.create(&new_user("alice")).await.unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
        assert_eq!(by_id.role, UserRole::Member);
        assert!(by_id.is_active);

        let by_name = repo.get_by_username("alice").await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(created.id));

        let by_email = repo.get_by_email("alice@example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(created.id));
    }

    #[tokio::test]
    async fn test_get_missing_user() {
        let repo = setup().await;
        assert!(repo.get_by_id(42).await.unwrap().is_none());
        assert!(repo.get_by_username("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected_by_store() {
        let repo = setup().await;
        repo.create(&new_user("bob")).await.unwrap();

        let mut duplicate = new_user("bob");
        duplicate.email = "other@example.com".into();
        assert!(repo.create(&duplicate).await.is_err());
    }

    #[tokio::test]
    async fn test_update_ban_state() {
        let repo = setup().await;
        let mut user = repo.create(&new_user("carol")).await.unwrap();

        user.is_banned = true;
        user.reason_banned = Some("Spam".into());
        user.description = Some("Hello".into());
        repo.update(&user).await.unwrap();

        let stored = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(stored.is_banned);
        assert_eq!(stored.reason_banned.as_deref(), Some("Spam"));
        assert_eq!(stored.description.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_create_with_profile_writes_both_rows() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let repo = SqlxUserRepository::new(pool.clone());

        let user = repo
            .create_with_profile(&new_user("pro"), "Solicitor")
            .await
            .unwrap();

        let (flair,): (String,) =
            sqlx::query_as("SELECT flair FROM professionals WHERE user_id = ?")
                .bind(user.id)
                .fetch_one(pool.as_sqlite().unwrap())
                .await
                .unwrap();
        assert_eq!(flair, "Solicitor");
    }

    #[tokio::test]
    async fn test_create_with_profile_rolls_back_user_on_failure() {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let sqlite = pool.as_sqlite().unwrap();
        sqlx::query("DROP TABLE educations").execute(sqlite).await.unwrap();
        sqlx::query("DROP TABLE employments").execute(sqlite).await.unwrap();
        sqlx::query("DROP TABLE professionals").execute(sqlite).await.unwrap();
        let repo = SqlxUserRepository::new(pool.clone());

        assert!(repo
            .create_with_profile(&new_user("half"), "Solicitor")
            .await
            .is_err());
        assert!(repo.get_by_username("half").await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count() {
        let repo = setup().await;
        assert_eq!(repo.count().await.unwrap(), 0);
        repo.create(&new_user("dave")).await.unwrap();
        repo.create(&new_user("erin")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);
    }
}
