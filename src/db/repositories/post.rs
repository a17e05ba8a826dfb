//! Post repository
//!
//! Listings carry the author name and a score computed from `post_votes` at
//! read time.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{on_pool, InsertId};
use crate::db::DynDatabasePool;
use crate::models::{ContentStatus, Post, PostSummary};

const POST_COLUMNS: &str = "id, title, text, slug, user_id, view_count, is_deleted, created_at";

const SUMMARY_SELECT: &str = r#"
    SELECT p.id, p.title, p.slug, p.user_id, u.username AS author, p.view_count,
        (SELECT COUNT(*) FROM post_votes v WHERE v.post_id = p.id AND v.vote_type = 'up')
        - (SELECT COUNT(*) FROM post_votes v WHERE v.post_id = p.id AND v.vote_type = 'down')
        AS score,
        p.created_at
    FROM posts p
    JOIN users u ON u.id = p.user_id
"#;

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(
        &self,
        user_id: i64,
        title: &str,
        text: &str,
        slug: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Deleted posts are returned too
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    /// Write title, text and status back
    async fn save(&self, post: &Post) -> Result<()>;

    async fn increment_views(&self, id: i64) -> Result<()>;

    /// Non-deleted posts, newest first
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<PostSummary>>;

    async fn count_active(&self) -> Result<i64>;

    /// Non-deleted posts whose title contains `query`, ignoring case
    async fn search(&self, query: &str, offset: i64, limit: i64) -> Result<Vec<PostSummary>>;

    async fn count_search(&self, query: &str) -> Result<i64>;

    async fn list_by_user(&self, user_id: i64, limit: i64) -> Result<Vec<PostSummary>>;
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

/// LIKE pattern matching `query` anywhere, with wildcards in the query escaped by `!`
fn contains_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.to_lowercase().chars() {
        if matches!(c, '!' | '%' | '_') {
            pattern.push('!');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(
        &self,
        user_id: i64,
        title: &str,
        text: &str,
        slug: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Post> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                r#"
                INSERT INTO posts (title, text, slug, user_id, view_count, is_deleted, created_at)
                VALUES (?, ?, ?, ?, 0, ?, ?)
                "#,
            )
            .bind(title)
            .bind(text)
            .bind(slug)
            .bind(user_id)
            .bind(false)
            .bind(created_at)
            .execute(p)
            .await
            .map(|r| r.insert_id())
        })
        .context("Failed to create post")?;

        Ok(Post {
            id,
            title: title.to_string(),
            text: text.to_string(),
            slug: slug.to_string(),
            user_id,
            view_count: 0,
            status: ContentStatus::Active,
            created_at,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
        let post = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Post>(&sql).bind(id).fetch_optional(p).await
        })
        .context("Failed to get post by ID")?;
        Ok(post)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE slug = ?", POST_COLUMNS);
        let post = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Post>(&sql).bind(slug).fetch_optional(p).await
        })
        .context("Failed to get post by slug")?;
        Ok(post)
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let (count,) = on_pool!(self.pool, p => {
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM posts WHERE slug = ?")
                .bind(slug)
                .fetch_one(p)
                .await
        })
        .context("Failed to check slug")?;
        Ok(count > 0)
    }

    async fn save(&self, post: &Post) -> Result<()> {
        on_pool!(self.pool, p => {
            sqlx::query("UPDATE posts SET title = ?, text = ?, is_deleted = ? WHERE id = ?")
                .bind(&post.title)
                .bind(&post.text)
                .bind(post.is_deleted())
                .bind(post.id)
                .execute(p)
                .await
                .map(|_| ())
        })
        .context("Failed to save post")?;
        Ok(())
    }

    async fn increment_views(&self, id: i64) -> Result<()> {
        on_pool!(self.pool, p => {
            sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = ?")
                .bind(id)
                .execute(p)
                .await
                .map(|_| ())
        })
        .context("Failed to increment view count")?;
        Ok(())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<PostSummary>> {
        let sql = format!(
            "{} WHERE p.is_deleted = 0 ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?",
            SUMMARY_SELECT
        );
        let posts = on_pool!(self.pool, p => {
            sqlx::query_as::<_, PostSummary>(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(p)
                .await
        })
        .context("Failed to list posts")?;
        Ok(posts)
    }

    async fn count_active(&self) -> Result<i64> {
        let (count,) = on_pool!(self.pool, p => {
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM posts WHERE is_deleted = 0")
                .fetch_one(p)
                .await
        })
        .context("Failed to count posts")?;
        Ok(count)
    }

    async fn search(&self, query: &str, offset: i64, limit: i64) -> Result<Vec<PostSummary>> {
        let sql = format!(
            "{} WHERE p.is_deleted = 0 AND LOWER(p.title) LIKE ? ESCAPE '!' \
             ORDER BY p.created_at DESC, p.id DESC LIMIT ? OFFSET ?",
            SUMMARY_SELECT
        );
        let pattern = contains_pattern(query);
        let posts = on_pool!(self.pool, p => {
            sqlx::query_as::<_, PostSummary>(&sql)
                .bind(&pattern)
                .bind(limit)
                .bind(offset)
                .fetch_all(p)
                .await
        })
        .context("Failed to search posts")?;
        Ok(posts)
    }

    async fn count_search(&self, query: &str) -> Result<i64> {
        let pattern = contains_pattern(query);
        let (count,) = on_pool!(self.pool, p => {
            sqlx::query_as::<_, (i64,)>(
                "SELECT COUNT(*) FROM posts WHERE is_deleted = 0 AND LOWER(title) LIKE ? ESCAPE '!'",
            )
            .bind(&pattern)
            .fetch_one(p)
            .await
        })
        .context("Failed to count search results")?;
        Ok(count)
    }

    async fn list_by_user(&self, user_id: i64, limit: i64) -> Result<Vec<PostSummary>> {
        let sql = format!(
            "{} WHERE p.is_deleted = 0 AND p.user_id = ? ORDER BY p.created_at DESC, p.id DESC LIMIT ?",
            SUMMARY_SELECT
        );
        let posts = on_pool!(self.pool, p => {
            sqlx::query_as::<_, PostSummary>(&sql)
                .bind(user_id)
                .bind(limit)
                .fetch_all(p)
                .await
        })
        .context("Failed to list posts by user")?;
        Ok(posts)
    }
}
