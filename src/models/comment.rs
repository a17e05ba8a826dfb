//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::post::{ContentStatus, DELETED_SENTINEL};
use super::validation::{require_text, ValidationError};

pub const COMMENT_TEXT_MAX: usize = 4_000;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub text: String,
    #[sqlx(rename = "is_deleted", try_from = "bool")]
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Clear the text and mark the comment deleted.
    pub fn tombstone(mut self) -> Self {
        self.text = DELETED_SENTINEL.to_string();
        self.status = ContentStatus::Deleted;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.status.is_deleted()
    }
}

/// Comment with author name and score, as shown under a post
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommentWithMeta {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub author: String,
    pub text: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

pub fn validate_comment_text(text: &str) -> Result<(), ValidationError> {
    require_text("Comment", text, COMMENT_TEXT_MAX)
}
