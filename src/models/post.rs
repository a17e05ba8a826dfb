//! Forum post model and the tombstone rule shared with comments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::validation::{require_text, ValidationError};

/// Text written over the fields of deleted content
pub const DELETED_SENTINEL: &str = "[deleted]";

pub const TITLE_MAX: usize = 256;
pub const POST_TEXT_MAX: usize = 40_000;
/// Room left after the base slug for a `-N` collision suffix
const SLUG_BASE_MAX: usize = 240;

/// Whether a post or comment is live or has been tombstoned.
///
/// Stored as the `is_deleted` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Active,
    Deleted,
}

impl ContentStatus {
    pub fn is_deleted(self) -> bool {
        self == ContentStatus::Deleted
    }
}

impl From<bool> for ContentStatus {
    fn from(is_deleted: bool) -> Self {
        if is_deleted {
            ContentStatus::Deleted
        } else {
            ContentStatus::Active
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub text: String,
    pub slug: String,
    pub user_id: i64,
    pub view_count: i64,
    #[sqlx(rename = "is_deleted", try_from = "bool")]
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Clear title and text and mark the post deleted. Identity, author,
    /// timestamps and votes are kept.
    pub fn tombstone(mut self) -> Self {
        self.title = DELETED_SENTINEL.to_string();
        self.text = DELETED_SENTINEL.to_string();
        self.status = ContentStatus::Deleted;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.status.is_deleted()
    }
}

/// Post row for listings, with author and current score.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub user_id: i64,
    pub author: String,
    pub view_count: i64,
    pub score: i64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a post
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    pub text: String,
}

impl CreatePostInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("Title", &self.title, TITLE_MAX)?;
        require_text("Text", &self.text, POST_TEXT_MAX)
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}

/// Clamp a requested page into `1..=last`, where an empty listing still
/// has a single (empty) page.
pub fn clamp_page(requested: i64, total: i64, per_page: i64) -> (i64, i64) {
    let total_pages = if total <= 0 {
        1
    } else {
        (total + per_page - 1) / per_page
    };
    (requested.clamp(1, total_pages), total_pages)
}

/// Turn a title into a URL slug.
///
/// The title is NFKD-normalized first so accented letters keep their base
/// letter. Lowercases ASCII letters and digits, keeps underscores, drops
/// other punctuation and anything still non-ASCII, and joins words with
/// single hyphens. Titles with nothing usable become `post`.
pub fn generate_slug(title: &str) -> String {
    let mut slug = String::new();
    let mut pending_hyphen = false;

    for c in title.nfkd() {
        if c.is_ascii_alphanumeric() || c == '_' {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_hyphen = true;
        }
    }

    let slug = slug.trim_matches(|c| c == '-' || c == '_');
    if slug.is_empty() {
        return "post".to_string();
    }

    match slug.char_indices().nth(SLUG_BASE_MAX) {
        Some((idx, _)) => slug[..idx].trim_end_matches('-').to_string(),
        None => slug.to_string(),
    }
}

/// The `n`th candidate for a slug: `base`, `base-1`, `base-2`, ...
pub fn slug_candidate(base: &str, n: usize) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, n)
    }
}
