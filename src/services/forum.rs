//! Forum service
//!
//! Posts, comments, votes and the listings built on them. Every mutation
//! goes through the central policy first.

use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::db::repositories::{
    is_unique_violation, CommentRepository, PostRepository, VoteRepository,
};
use crate::models::{
    clamp_page, generate_slug, slug_candidate, validate_comment_text, Comment, CommentWithMeta,
    CreatePostInput, Page, Post, PostSummary, Score, User, ValidationError, VoteKind, VoteTarget,
};
use crate::services::policy::{authorize, Action, Decision, Resource};

/// Posts shown by the latest feed
pub const LATEST_COUNT: i64 = 5;

/// Posts and comments shown on a profile
pub const PROFILE_RECENT_COUNT: i64 = 3;

const DEFAULT_PAGE_SIZE: i64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ForumServiceError {
    #[error("{0}")]
    ValidationError(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A post with its score and live comments
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub post: Post,
    pub score: i64,
    pub comments: Vec<CommentWithMeta>,
}

/// Recent activity of one user
#[derive(Debug, Clone, Serialize)]
pub struct RecentActivity {
    pub posts: Vec<PostSummary>,
    pub comments: Vec<CommentWithMeta>,
}

pub struct ForumService {
    posts: Arc<dyn PostRepository>,
    comments: Arc<dyn CommentRepository>,
    votes: Arc<dyn VoteRepository>,
    page_size: i64,
}

impl ForumService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        comments: Arc<dyn CommentRepository>,
        votes: Arc<dyn VoteRepository>,
    ) -> Self {
        Self {
            posts,
            comments,
            votes,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Live posts, newest first. Pages past the end land on the last page.
    pub async fn index(&self, page: i64) -> Result<Page<PostSummary>, ForumServiceError> {
        let total = self
            .posts
            .count_active()
            .await
            .context("Failed to count posts")?;
        let (page, total_pages) = clamp_page(page, total, self.page_size);

        let items = self
            .posts
            .list((page - 1) * self.page_size, self.page_size)
            .await
            .context("Failed to list posts")?;

        Ok(Page {
            items,
            page,
            per_page: self.page_size,
            total,
            total_pages,
        })
    }

    /// Post detail by slug; counts as a view.
    ///
    /// Deleted posts are still returned, carrying the sentinel text.
    pub async fn detail(&self, slug: &str) -> Result<PostDetail, ForumServiceError> {
        let mut post = self.post_by_slug(slug).await?;

        self.posts
            .increment_views(post.id)
            .await
            .context("Failed to count view")?;
        post.view_count += 1;

        let score = self.score(VoteTarget::Post(post.id)).await?;
        let comments = self
            .comments
            .list_for_post(post.id)
            .await
            .context("Failed to list comments")?;

        Ok(PostDetail {
            post,
            score: score.value(),
            comments,
        })
    }

    /// Create a post under a slug unique among all posts
    pub async fn create_post(
        &self,
        user: &User,
        input: CreatePostInput,
    ) -> Result<Post, ForumServiceError> {
        deny_unless(authorize(user, Resource::Forum, Action::Create))?;
        input.validate()?;

        let post = self.insert_with_unique_slug(user, &input).await?;

        tracing::info!("User {} created post '{}'", user.username, post.slug);
        Ok(post)
    }

    pub async fn add_comment(
        &self,
        user: &User,
        slug: &str,
        text: &str,
    ) -> Result<Comment, ForumServiceError> {
        let post = self.live_post(slug).await?;
        deny_unless(authorize(user, Resource::Post(&post), Action::Comment))?;
        validate_comment_text(text)?;

        Ok(self
            .comments
            .create(post.id, user.id, text, Utc::now())
            .await
            .context("Failed to create comment")?)
    }

    /// Tombstone a post. Its comments and votes are left alone.
    pub async fn delete_post(&self, user: &User, slug: &str) -> Result<Post, ForumServiceError> {
        let post = self.post_by_slug(slug).await?;
        deny_unless(authorize(user, Resource::Post(&post), Action::Delete))?;
        if post.is_deleted() {
            return Ok(post);
        }

        let post = post.tombstone();
        self.posts.save(&post).await.context("Failed to delete post")?;

        tracing::info!("User {} deleted post {}", user.username, post.id);
        Ok(post)
    }

    pub async fn delete_comment(
        &self,
        user: &User,
        slug: &str,
        comment_id: i64,
    ) -> Result<Comment, ForumServiceError> {
        let post = self.post_by_slug(slug).await?;
        let comment = self.comment_of(&post, comment_id).await?;
        deny_unless(authorize(user, Resource::Comment(&comment), Action::Delete))?;
        if comment.is_deleted() {
            return Ok(comment);
        }

        let comment = comment.tombstone();
        self.comments
            .save(&comment)
            .await
            .context("Failed to delete comment")?;

        tracing::info!("User {} deleted comment {}", user.username, comment.id);
        Ok(comment)
    }

    /// Record the user's vote on a live post and return the new score
    pub async fn vote_post(
        &self,
        user: &User,
        slug: &str,
        kind: VoteKind,
    ) -> Result<Score, ForumServiceError> {
        let post = self.live_post(slug).await?;
        deny_unless(authorize(user, Resource::Post(&post), Action::Vote))?;
        self.cast(user, VoteTarget::Post(post.id), kind).await
    }

    pub async fn vote_comment(
        &self,
        user: &User,
        slug: &str,
        comment_id: i64,
        kind: VoteKind,
    ) -> Result<Score, ForumServiceError> {
        let post = self.live_post(slug).await?;
        let comment = self.comment_of(&post, comment_id).await?;
        if comment.is_deleted() {
            return Err(ForumServiceError::NotFound(format!("comment {}", comment_id)));
        }
        deny_unless(authorize(user, Resource::Comment(&comment), Action::Vote))?;
        self.cast(user, VoteTarget::Comment(comment.id), kind).await
    }

    /// Title search; a blank query yields an empty first page
    pub async fn search(&self, query: &str, page: i64) -> Result<Page<PostSummary>, ForumServiceError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Page {
                items: Vec::new(),
                page: 1,
                per_page: self.page_size,
                total: 0,
                total_pages: 1,
            });
        }

        let total = self
            .posts
            .count_search(query)
            .await
            .context("Failed to count search results")?;
        let (page, total_pages) = clamp_page(page, total, self.page_size);
        let items = self
            .posts
            .search(query, (page - 1) * self.page_size, self.page_size)
            .await
            .context("Failed to search posts")?;

        Ok(Page {
            items,
            page,
            per_page: self.page_size,
            total,
            total_pages,
        })
    }

    pub async fn latest(&self) -> Result<Vec<PostSummary>, ForumServiceError> {
        Ok(self
            .posts
            .list(0, LATEST_COUNT)
            .await
            .context("Failed to list latest posts")?)
    }

    pub async fn recent_activity(&self, user_id: i64) -> Result<RecentActivity, ForumServiceError> {
        let posts = self
            .posts
            .list_by_user(user_id, PROFILE_RECENT_COUNT)
            .await
            .context("Failed to list user posts")?;
        let comments = self
            .comments
            .list_by_user(user_id, PROFILE_RECENT_COUNT)
            .await
            .context("Failed to list user comments")?;
        Ok(RecentActivity { posts, comments })
    }

    async fn cast(
        &self,
        user: &User,
        target: VoteTarget,
        kind: VoteKind,
    ) -> Result<Score, ForumServiceError> {
        self.votes
            .cast(user.id, target, kind)
            .await
            .context("Failed to record vote")?;
        self.score(target).await
    }

    async fn score(&self, target: VoteTarget) -> Result<Score, ForumServiceError> {
        Ok(self.votes.score(target).await.context("Failed to compute score")?)
    }

    async fn post_by_slug(&self, slug: &str) -> Result<Post, ForumServiceError> {
        self.posts
            .get_by_slug(slug)
            .await
            .context("Failed to get post")?
            .ok_or_else(|| ForumServiceError::NotFound(format!("post '{}'", slug)))
    }

    async fn live_post(&self, slug: &str) -> Result<Post, ForumServiceError> {
        let post = self.post_by_slug(slug).await?;
        if post.is_deleted() {
            return Err(ForumServiceError::NotFound(format!("post '{}'", slug)));
        }
        Ok(post)
    }

    /// A comment that belongs to `post`
    async fn comment_of(&self, post: &Post, comment_id: i64) -> Result<Comment, ForumServiceError> {
        self.comments
            .get_by_id(comment_id)
            .await
            .context("Failed to get comment")?
            .filter(|c| c.post_id == post.id)
            .ok_or_else(|| ForumServiceError::NotFound(format!("comment {}", comment_id)))
    }

    /// Insert under the first free slug candidate. A concurrent create that
    /// claims the same candidate first makes the insert fail on the unique
    /// index, and the next candidate is tried.
    async fn insert_with_unique_slug(
        &self,
        user: &User,
        input: &CreatePostInput,
    ) -> Result<Post, ForumServiceError> {
        let base = generate_slug(&input.title);
        let mut n = 0;
        loop {
            let candidate = slug_candidate(&base, n);
            n += 1;
            if self
                .posts
                .slug_exists(&candidate)
                .await
                .context("Failed to check slug")?
            {
                continue;
            }

            match self
                .posts
                .create(user.id, &input.title, &input.text, &candidate, Utc::now())
                .await
            {
                Ok(post) => return Ok(post),
                Err(e) if is_unique_violation(&e) => {
                    tracing::debug!("Slug '{}' claimed concurrently, trying next", candidate);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn deny_unless(decision: Decision) -> Result<(), ForumServiceError> {
    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => Err(ForumServiceError::Forbidden(reason.to_string())),
    }
}
