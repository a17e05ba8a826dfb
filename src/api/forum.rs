//! Forum API endpoints
//!
//! Listings are JSON. Form posts answer with a 302 back to the relevant page.

use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{found, post_path, FormBody, PageQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreatePostInput, Page, PostSummary, VoteKind};
use crate::services::PostDetail;

/// Read-only forum routes, open to everyone
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/forum/", get(index))
        .route("/forum/post/{slug}/", get(detail))
        .route("/forum/search/", get(search))
        .route("/forum/latest/", get(latest))
}

/// Mutating forum routes; callers must be signed in and not banned
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/forum/create_post/", post(create_post))
        .route("/forum/post/{slug}/comment/", post(add_comment))
        .route("/forum/vote_post/{slug}/", post(vote_post))
        .route("/forum/vote_comment/{slug}/{comment_id}/", post(vote_comment))
        .route("/forum/delete_post/{slug}/", post(delete_post))
        .route("/forum/delete_comment/{slug}/{comment_id}/", post(delete_comment))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub query: String,
    #[serde(flatten)]
    pub results: Page<PostSummary>,
}

#[derive(Debug, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct VoteForm {
    #[serde(default)]
    pub vote_type: String,
}

impl VoteForm {
    fn kind(&self) -> Result<VoteKind, ApiError> {
        self.vote_type
            .parse()
            .map_err(|e: crate::models::ValidationError| ApiError::validation_error(e.to_string()))
    }
}

/// GET /forum/?page=
async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<PostSummary>>, ApiError> {
    Ok(Json(state.forum_service.index(query.page()).await?))
}

/// GET /forum/post/{slug}/
async fn detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostDetail>, ApiError> {
    Ok(Json(state.forum_service.detail(&slug).await?))
}

/// GET /forum/search/?q=&page=
async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, ApiError> {
    let page = PageQuery {
        page: query.page.clone(),
    }
    .page();
    let results = state.forum_service.search(&query.q, page).await?;
    Ok(Json(SearchResponse {
        query: query.q,
        results,
    }))
}

/// GET /forum/latest/
async fn latest(State(state): State<AppState>) -> Result<Json<Vec<PostSummary>>, ApiError> {
    Ok(Json(state.forum_service.latest().await?))
}

/// POST /forum/create_post/
async fn create_post(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    FormBody(input): FormBody<CreatePostInput>,
) -> Result<Response, ApiError> {
    let post = state.forum_service.create_post(&user, input).await?;
    Ok(found(&post_path(&post.slug)))
}

/// POST /forum/post/{slug}/comment/
async fn add_comment(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(slug): Path<String>,
    FormBody(form): FormBody<CommentForm>,
) -> Result<Response, ApiError> {
    state
        .forum_service
        .add_comment(&user, &slug, &form.comment)
        .await?;
    Ok(found(&post_path(&slug)))
}

/// POST /forum/vote_post/{slug}/
async fn vote_post(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(slug): Path<String>,
    FormBody(form): FormBody<VoteForm>,
) -> Result<Response, ApiError> {
    let kind = form.kind()?;
    state.forum_service.vote_post(&user, &slug, kind).await?;
    Ok(found(&post_path(&slug)))
}

/// POST /forum/vote_comment/{slug}/{comment_id}/
async fn vote_comment(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path((slug, comment_id)): Path<(String, i64)>,
    FormBody(form): FormBody<VoteForm>,
) -> Result<Response, ApiError> {
    let kind = form.kind()?;
    state
        .forum_service
        .vote_comment(&user, &slug, comment_id, kind)
        .await?;
    Ok(found(&post_path(&slug)))
}

/// POST /forum/delete_post/{slug}/
async fn delete_post(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    state.forum_service.delete_post(&user, &slug).await?;
    Ok(found("/forum/"))
}

/// POST /forum/delete_comment/{slug}/{comment_id}/
async fn delete_comment(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path((slug, comment_id)): Path<(String, i64)>,
) -> Result<Response, ApiError> {
    state
        .forum_service
        .delete_comment(&user, &slug, comment_id)
        .await?;
    Ok(found(&post_path(&slug)))
}
