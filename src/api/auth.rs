//! Authentication API endpoints
//!
//! Handles form posts for user authentication:
//! - POST /register - create an account, then go to the login page
//! - POST /login - open a session cookie, then go to the chatbot
//! - POST /logout - drop the session and clear the cookie

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    response::Response,
    routing::post,
    Router,
};
use serde::Deserialize;

use crate::api::common::{found, FormBody};
use crate::api::middleware::{extract_session_token, ApiError, AppState, LOGIN_PATH};
use crate::services::user::{AccountType, LoginInput, RegisterInput};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    #[serde(alias = "password1")]
    pub password: String,
    pub password2: String,
    #[serde(default)]
    pub user_type: AccountType,
    #[serde(default)]
    pub flair: Option<String>,
}

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(alias = "username_or_email")]
    pub username: String,
    pub password: String,
}

/// POST /register
async fn register(
    State(state): State<AppState>,
    FormBody(form): FormBody<RegisterForm>,
) -> Result<Response, ApiError> {
    let input = RegisterInput {
        first_name: form.first_name,
        last_name: form.last_name,
        username: form.username,
        email: form.email,
        password: form.password,
        password2: form.password2,
        account_type: form.user_type,
        flair: form.flair.filter(|f| !f.trim().is_empty()),
    };

    state.user_service.register(input).await?;
    Ok(found(LOGIN_PATH))
}

/// POST /login
async fn login(
    State(state): State<AppState>,
    FormBody(form): FormBody<LoginForm>,
) -> Result<Response, ApiError> {
    let session = state
        .user_service
        .login(LoginInput::new(form.username, form.password))
        .await?;

    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        session.id,
        state.session_days * 24 * 60 * 60
    );
    with_cookie(found("/chatbot/"), &cookie)
}

/// POST /logout
async fn logout(State(state): State<AppState>, request: Request) -> Result<Response, ApiError> {
    if let Some(token) = extract_session_token(&request) {
        state.user_service.logout(&token).await?;
    }
    with_cookie(found("/"), CLEAR_COOKIE)
}

pub(crate) const CLEAR_COOKIE: &str = "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";

pub(crate) fn with_cookie(mut response: Response, cookie: &str) -> Result<Response, ApiError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|_| ApiError::internal_error("Invalid cookie value"))?;
    response.headers_mut().insert(header::SET_COOKIE, value);
    Ok(response)
}
