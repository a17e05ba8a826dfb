//! API middleware
//!
//! Contains middleware for:
//! - Authentication (session token lookup)
//! - Login and ban gates for the form surfaces
//!
//! and the `ApiError` envelope every handler returns.

use axum::{
    extract::{rejection::FormRejection, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::common::found;
use crate::models::User;
use crate::services::{
    ChatService, ChatServiceError, ForumService, ForumServiceError, ProfessionalService,
    UserService, UserServiceError,
};

pub const LOGIN_PATH: &str = "/login";
pub const BANNED_PATH: &str = "/banned/";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub professional_service: Arc<ProfessionalService>,
    pub forum_service: Arc<ForumService>,
    pub chat_service: Arc<ChatService>,
    /// Lifetime of the session cookie
    pub session_days: i64,
}

impl AppState {
    /// Wire repositories and services over `pool`
    pub fn new(
        pool: crate::db::DynDatabasePool,
        config: &crate::config::Config,
        model: Arc<dyn crate::services::ChatModel>,
    ) -> Self {
        use crate::db::repositories::{
            SqlxAuthSessionRepository, SqlxChatRepository, SqlxCommentRepository,
            SqlxPostRepository, SqlxProfessionalRepository, SqlxUserRepository,
            SqlxVoteRepository,
        };

        let user_service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxAuthSessionRepository::boxed(pool.clone()),
        )
        .with_session_expiration(config.auth.session_days);
        let professional_service =
            ProfessionalService::new(SqlxProfessionalRepository::boxed(pool.clone()));
        let forum_service = ForumService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxCommentRepository::boxed(pool.clone()),
            SqlxVoteRepository::boxed(pool.clone()),
        )
        .with_page_size(config.forum.page_size);
        let chat_service = ChatService::new(SqlxChatRepository::boxed(pool.clone()), model);

        Self {
            user_service: Arc::new(user_service),
            professional_service: Arc::new(professional_service),
            forum_service: Arc::new(forum_service),
            chat_service: Arc::new(chat_service),
            session_days: config.auth.session_days,
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn upstream_error(message: impl Into<String>) -> Self {
        Self::new("UPSTREAM_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "UPSTREAM_ERROR" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::validation_error(rejection.body_text())
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(e) => ApiError::validation_error(e.to_string()),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound(msg) => ApiError::not_found(msg),
            UserServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            UserServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<ForumServiceError> for ApiError {
    fn from(e: ForumServiceError) -> Self {
        match e {
            ForumServiceError::ValidationError(e) => ApiError::validation_error(e.to_string()),
            ForumServiceError::NotFound(msg) => ApiError::not_found(msg),
            ForumServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ForumServiceError::InternalError(e) => internal(e),
        }
    }
}

impl From<ChatServiceError> for ApiError {
    fn from(e: ChatServiceError) -> Self {
        match e {
            ChatServiceError::ValidationError(e) => ApiError::validation_error(e.to_string()),
            ChatServiceError::NotFound(id) => ApiError::not_found(format!("Chat session {}", id)),
            ChatServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            ChatServiceError::Upstream(_) => {
                ApiError::upstream_error("The chatbot is unavailable right now")
            }
            ChatServiceError::InternalError(e) => internal(e),
        }
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    tracing::error!("Request failed: {:#}", e);
    ApiError::internal_error("Internal server error")
}

/// Extract session token from request
pub(crate) fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Resolve the session, if any, and attach the user to the request.
///
/// Runs on every route; the gates below only inspect the extension.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(&request) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed: {}", e),
        }
    }
    next.run(request).await
}

/// Send anonymous callers to the login page
pub async fn require_auth(request: Request, next: Next) -> Response {
    if get_authenticated_user(&request).is_none() {
        return found(LOGIN_PATH);
    }
    next.run(request).await
}

/// Send banned users to the ban notice
pub async fn ban_forbidden(request: Request, next: Next) -> Response {
    if get_authenticated_user(&request).is_some_and(|u| u.is_banned) {
        return found(BANNED_PATH);
    }
    next.run(request).await
}

/// Extract authenticated user from request extensions
pub fn get_authenticated_user(request: &Request) -> Option<&User> {
    request.extensions().get::<AuthenticatedUser>().map(|au| &au.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValidationError;
    use axum::{body::Body, http::Request};

    fn create_request_with_auth(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn create_request_with_cookie(cookie: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let request = create_request_with_auth("test-token-123");
        assert_eq!(extract_session_token(&request), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie_list() {
        let request = create_request_with_cookie("theme=dark; session=test-token-456");
        assert_eq!(extract_session_token(&request), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer bearer-token")
            .header(header::COOKIE, "session=cookie-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_session_token(&request), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        assert!(extract_session_token(&request).is_none());

        let basic = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Basic invalid")
            .body(Body::empty())
            .unwrap();
        assert!(extract_session_token(&basic).is_none());
    }

    #[test]
    fn test_service_errors_map_to_status() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (
                ForumServiceError::ValidationError(ValidationError::Required("Comment")).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                ForumServiceError::Forbidden("no".into()).into(),
                StatusCode::FORBIDDEN,
            ),
            (ChatServiceError::NotFound(3).into(), StatusCode::NOT_FOUND),
            (
                ChatServiceError::Upstream(anyhow::anyhow!("timeout")).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                UserServiceError::UserExists("taken".into()).into(),
                StatusCode::CONFLICT,
            ),
            (
                UserServiceError::InternalError(anyhow::anyhow!("db down")).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.status(), status, "{:?}", error);
        }
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let error: ApiError = UserServiceError::InternalError(anyhow::anyhow!("secret dsn")).into();
        assert!(!error.error.message.contains("secret"));
    }
}
