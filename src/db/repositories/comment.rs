//! Comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{on_pool, InsertId};
use crate::db::DynDatabasePool;
use crate::models::{Comment, CommentWithMeta, ContentStatus};

const META_SELECT: &str = r#"
    SELECT c.id, c.post_id, c.user_id, u.username AS author, c.text,
        (SELECT COUNT(*) FROM comment_votes v WHERE v.comment_id = c.id AND v.vote_type = 'up')
        - (SELECT COUNT(*) FROM comment_votes v WHERE v.comment_id = c.id AND v.vote_type = 'down')
        AS score,
        c.created_at
    FROM comments c
    JOIN users u ON u.id = c.user_id
"#;

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(
        &self,
        post_id: i64,
        user_id: i64,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Write text and status back
    async fn save(&self, comment: &Comment) -> Result<()>;

    /// Non-deleted comments of a post, newest first
    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithMeta>>;

    async fn list_by_user(&self, user_id: i64, limit: i64) -> Result<Vec<CommentWithMeta>>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(
        &self,
        post_id: i64,
        user_id: i64,
        text: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Comment> {
        let id = on_pool!(self.pool, p => {
            sqlx::query(
                "INSERT INTO comments (post_id, user_id, text, is_deleted, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(post_id)
            .bind(user_id)
            .bind(text)
            .bind(false)
            .bind(created_at)
            .execute(p)
            .await
            .map(|r| r.insert_id())
        })
        .context("Failed to create comment")?;

        Ok(Comment {
            id,
            post_id,
            user_id,
            text: text.to_string(),
            status: ContentStatus::Active,
            created_at,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let comment = on_pool!(self.pool, p => {
            sqlx::query_as::<_, Comment>(
                "SELECT id, post_id, user_id, text, is_deleted, created_at FROM comments WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(p)
            .await
        })
        .context("Failed to get comment by ID")?;
        Ok(comment)
    }

    async fn save(&self, comment: &Comment) -> Result<()> {
        on_pool!(self.pool, p => {
            sqlx::query("UPDATE comments SET text = ?, is_deleted = ? WHERE id = ?")
                .bind(&comment.text)
                .bind(comment.is_deleted())
                .bind(comment.id)
                .execute(p)
                .await
                .map(|_| ())
        })
        .context("Failed to save comment")?;
        Ok(())
    }

    async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithMeta>> {
        let sql = format!(
            "{} WHERE c.post_id = ? AND c.is_deleted = 0 ORDER BY c.created_at DESC, c.id DESC",
            META_SELECT
        );
        let comments = on_pool!(self.pool, p => {
            sqlx::query_as::<_, CommentWithMeta>(&sql)
                .bind(post_id)
                .fetch_all(p)
                .await
        })
        .context("Failed to list comments")?;
        Ok(comments)
    }

    async fn list_by_user(&self, user_id: i64, limit: i64) -> Result<Vec<CommentWithMeta>> {
        let sql = format!(
            "{} WHERE c.user_id = ? AND c.is_deleted = 0 ORDER BY c.created_at DESC, c.id DESC LIMIT ?",
            META_SELECT
        );
        let comments = on_pool!(self.pool, p => {
            sqlx::query_as::<_, CommentWithMeta>(&sql)
                .bind(user_id)
                .bind(limit)
                .fetch_all(p)
                .await
        })
        .context("Failed to list comments by user")?;
        Ok(comments)
    }
}
