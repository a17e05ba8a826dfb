//! Chatbot API endpoints
//!
//! The process endpoint speaks JSON in both directions and reports failures
//! as `{"error": "..."}` rather than the usual envelope.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::found;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::services::{ChatServiceError, SessionView};

/// Routes that also serve anonymous callers
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/chatbot/", get(home))
        .route("/chatbot/process/", post(process))
        .route("/chatbot/create_session/", post(create_session))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/chatbot/{session_id}/", get(session))
}

/// Error body of the process endpoint
#[derive(Debug)]
pub struct ChatError {
    status: StatusCode,
    message: String,
}

impl ChatError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

impl From<JsonRejection> for ChatError {
    fn from(rejection: JsonRejection) -> Self {
        ChatError::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl From<ChatServiceError> for ChatError {
    fn from(e: ChatServiceError) -> Self {
        let api: ApiError = e.into();
        ChatError::new(api.status(), api.error.message)
    }
}

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ChatError))]
pub struct ChatJson<T>(pub T);

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub session_id: Option<i64>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub response: String,
}

/// GET /chatbot/
///
/// Signed-in users land on their latest session after empty ones are pruned.
async fn home(
    State(state): State<AppState>,
    user: Option<Extension<AuthenticatedUser>>,
) -> Result<Response, ApiError> {
    let Some(Extension(AuthenticatedUser(user))) = user else {
        return Ok(Json(serde_json::json!({ "authenticated": false })).into_response());
    };

    let session = state.chat_service.enter(&user).await?;
    Ok(found(&format!("/chatbot/{}/", session.id)))
}

/// GET /chatbot/{session_id}/
async fn session(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    Path(session_id): Path<i64>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(state.chat_service.open(&user, session_id).await?))
}

/// POST /chatbot/process/
async fn process(
    State(state): State<AppState>,
    user: Option<Extension<AuthenticatedUser>>,
    ChatJson(body): ChatJson<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ChatError> {
    let user = user.map(|Extension(AuthenticatedUser(u))| u);
    let response = state
        .chat_service
        .process(user.as_ref(), body.session_id, &body.message)
        .await?;
    Ok(Json(ProcessResponse { response }))
}

/// POST /chatbot/create_session/
async fn create_session(
    State(state): State<AppState>,
    user: Option<Extension<AuthenticatedUser>>,
) -> Result<Response, ChatError> {
    let Some(Extension(AuthenticatedUser(user))) = user else {
        return Err(ChatError::new(
            StatusCode::FORBIDDEN,
            "User is not authenticated",
        ));
    };

    let session = state.chat_service.create_session(&user).await?;
    Ok(found(&format!("/chatbot/{}/", session.id)))
}
