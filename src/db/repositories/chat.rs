//! Chat session and message repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{on_pool, InsertId};
use crate::db::DynDatabasePool;
use crate::models::{ChatMessage, ChatSession, MessageRole, NewMessage};

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_session(&self, user_id: i64) -> Result<ChatSession>;

    async fn get_session(&self, id: i64) -> Result<Option<ChatSession>>;

    /// Sessions of a user, most recently created first
    async fn list_sessions(&self, user_id: i64) -> Result<Vec<ChatSession>>;

    /// Delete the user's sessions that have no messages, sparing `keep`.
    /// Returns the number of sessions removed.
    async fn delete_empty_sessions(&self, user_id: i64, keep: Option<i64>) -> Result<u64>;

    /// Messages of a session in the order they were written
    async fn list_messages(&self, session_id: i64) -> Result<Vec<ChatMessage>>;

    async fn has_role(&self, session_id: i64, role: MessageRole) -> Result<bool>;

    /// Append messages atomically, in order. Returns the new message ids.
    async fn append_messages(&self, session_id: i64, messages: &[NewMessage]) -> Result<Vec<i64>>;

    async fn delete_messages(&self, ids: &[i64]) -> Result<()>;
}

pub struct SqlxChatRepository {
    pool: DynDatabasePool,
}

impl SqlxChatRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ChatRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ChatRepository for SqlxChatRepository {
    async fn create_session(&self, user_id: i64) -> Result<ChatSession> {
        let created_at = Utc::now();
        let id = on_pool!(self.pool, p => {
            sqlx::query("INSERT INTO sessions (user_id, created_at) VALUES (?, ?)")
                .bind(user_id)
                .bind(created_at)
                .execute(p)
                .await
                .map(|r| r.insert_id())
        })
        .context("Failed to create chat session")?;

        Ok(ChatSession {
            id,
            user_id,
            created_at,
        })
    }

    async fn get_session(&self, id: i64) -> Result<Option<ChatSession>> {
        let session = on_pool!(self.pool, p => {
            sqlx::query_as::<_, ChatSession>("SELECT id, user_id, created_at FROM sessions WHERE id = ?")
                .bind(id)
                .fetch_optional(p)
                .await
        })
        .context("Failed to get chat session")?;
        Ok(session)
    }

    async fn list_sessions(&self, user_id: i64) -> Result<Vec<ChatSession>> {
        let sessions = on_pool!(self.pool, p => {
            sqlx::query_as::<_, ChatSession>(
                "SELECT id, user_id, created_at FROM sessions WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            )
            .bind(user_id)
            .fetch_all(p)
            .await
        })
        .context("Failed to list chat sessions")?;
        Ok(sessions)
    }

    async fn delete_empty_sessions(&self, user_id: i64, keep: Option<i64>) -> Result<u64> {
        // ids start at 1, so 0 never spares a real session
        let keep = keep.unwrap_or(0);
        let deleted = on_pool!(self.pool, p => {
            sqlx::query(
                r#"
                DELETE FROM sessions
                WHERE user_id = ? AND id <> ?
                  AND NOT EXISTS (SELECT 1 FROM messages m WHERE m.session_id = sessions.id)
                "#,
            )
            .bind(user_id)
            .bind(keep)
            .execute(p)
            .await
            .map(|r| r.rows_affected())
        })
        .context("Failed to prune empty chat sessions")?;
        Ok(deleted)
    }

    async fn list_messages(&self, session_id: i64) -> Result<Vec<ChatMessage>> {
        let messages = on_pool!(self.pool, p => {
            sqlx::query_as::<_, ChatMessage>(
                r#"
                SELECT id, session_id, role, text, created_at
                FROM messages
                WHERE session_id = ?
                ORDER BY created_at ASC, id ASC
                "#,
            )
            .bind(session_id)
            .fetch_all(p)
            .await
        })
        .context("Failed to list chat messages")?;
        Ok(messages)
    }

    async fn has_role(&self, session_id: i64, role: MessageRole) -> Result<bool> {
        let (count,) = on_pool!(self.pool, p => {
            sqlx::query_as::<_, (i64,)>(
                "SELECT COUNT(*) FROM messages WHERE session_id = ? AND role = ?",
            )
            .bind(session_id)
            .bind(role.as_str())
            .fetch_one(p)
            .await
        })
        .context("Failed to inspect chat messages")?;
        Ok(count > 0)
    }

    async fn append_messages(&self, session_id: i64, messages: &[NewMessage]) -> Result<Vec<i64>> {
        let ids = on_pool!(self.pool, p => {
            let mut tx = p.begin().await.context("Failed to begin transaction")?;
            let mut ids = Vec::with_capacity(messages.len());
            for message in messages {
                let result = sqlx::query(
                    "INSERT INTO messages (session_id, role, text, created_at) VALUES (?, ?, ?, ?)",
                )
                .bind(session_id)
                .bind(message.role().as_str())
                .bind(message.text())
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .context("Failed to insert chat message")?;
                ids.push(result.insert_id());
            }
            tx.commit().await.context("Failed to commit chat messages")?;
            ids
        });
        Ok(ids)
    }

    async fn delete_messages(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM messages WHERE id IN ({})", placeholders);
        on_pool!(self.pool, p => {
            let mut query = sqlx::query(&sql);
            for id in ids {
                query = query.bind(*id);
            }
            query.execute(p).await.map(|_| ())
        })
        .context("Failed to delete chat messages")?;
        Ok(())
    }
}
