//! Profile and moderation endpoints

use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{checked, found, FormBody};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CommentWithMeta, PostSummary};

/// Routes behind both the login and the ban gate
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile/{username}/", get(profile))
        .route("/ban/{username}/", post(ban))
}

/// The ban notice; reachable by banned users
pub fn banned_router() -> Router<AppState> {
    Router::new().route("/banned/", get(banned))
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub description: Option<String>,
    pub flair: Option<String>,
    pub is_banned: bool,
    pub recent_posts: Vec<PostSummary>,
    pub recent_comments: Vec<CommentWithMeta>,
}

#[derive(Debug, Serialize)]
pub struct BannedResponse {
    pub is_banned: bool,
    pub reason_banned: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BanForm {
    #[serde(default)]
    pub reason_banned: String,
    pub confirm_ban: Option<String>,
}

/// GET /profile/{username}/
async fn profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state
        .user_service
        .get_by_username(&username)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User '{}' not found", username)))?;

    let flair = state.professional_service.flair(user.id).await?;
    let activity = state.forum_service.recent_activity(user.id).await?;

    Ok(Json(ProfileResponse {
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        description: user.description,
        flair,
        is_banned: user.is_banned,
        recent_posts: activity.posts,
        recent_comments: activity.comments,
    }))
}

/// POST /ban/{username}/
async fn ban(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(actor)): Extension<AuthenticatedUser>,
    Path(username): Path<String>,
    FormBody(form): FormBody<BanForm>,
) -> Result<Response, ApiError> {
    let banned = state
        .user_service
        .ban(
            &actor,
            &username,
            &form.reason_banned,
            checked(form.confirm_ban.as_deref()),
        )
        .await?;
    Ok(found(&format!(
        "/profile/{}/",
        urlencoding::encode(&banned.username)
    )))
}

/// GET /banned/
async fn banned(
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Json<BannedResponse> {
    Json(BannedResponse {
        is_banned: user.is_banned,
        reason_banned: user.reason_banned,
    })
}
