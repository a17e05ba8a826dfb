//! Dashboard API endpoints
//!
//! `GET /dashboard/` returns the signed-in user's account and credentials.
//! Each update form posts to its own route and redirects back on success.

use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::api::auth::{with_cookie, CLEAR_COOKIE};
use crate::api::common::{checked, empty_as_none, found, FormBody};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{EducationInput, EmploymentInput};
use crate::services::user::{ChangePasswordInput, UpdateDetailsInput};
use crate::services::Dashboard;

const DASHBOARD_PATH: &str = "/dashboard/";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard/", get(dashboard))
        .route("/update_details/", post(update_details))
        .route("/change_password/", post(change_password))
        .route("/deactivate_account/", post(deactivate_account))
        .route("/update_description/", post(update_description))
        .route("/update_flair/", post(update_flair))
        .route("/update_education/", post(update_education))
        .route("/update_employments/", post(update_employment))
}

#[derive(Debug, Deserialize)]
pub struct DetailsForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

#[derive(Debug, Deserialize)]
pub struct DeactivateForm {
    pub deactivate_profile: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DescriptionForm {
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FlairForm {
    #[serde(default)]
    pub flair: String,
}

#[derive(Debug, Deserialize)]
pub struct EducationForm {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub id: Option<i64>,
    pub school_name: String,
    pub degree: String,
    pub start_date: NaiveDate,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct EmploymentForm {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub id: Option<i64>,
    pub company: String,
    pub position: String,
    pub start_date: NaiveDate,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub end_date: Option<NaiveDate>,
}

/// GET /dashboard/
async fn dashboard(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
) -> Result<Json<Dashboard>, ApiError> {
    Ok(Json(state.professional_service.dashboard(&user).await?))
}

/// POST /update_details/
async fn update_details(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    FormBody(form): FormBody<DetailsForm>,
) -> Result<Response, ApiError> {
    let input = UpdateDetailsInput {
        first_name: form.first_name,
        last_name: form.last_name,
        email: form.email,
    };
    state.user_service.update_details(&user, input).await?;
    Ok(found(DASHBOARD_PATH))
}

/// POST /change_password/
async fn change_password(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    FormBody(form): FormBody<PasswordForm>,
) -> Result<Response, ApiError> {
    let input = ChangePasswordInput {
        old_password: form.old_password,
        new_password1: form.new_password1,
        new_password2: form.new_password2,
    };
    state.user_service.change_password(&user, input).await?;
    Ok(found(DASHBOARD_PATH))
}

/// POST /deactivate_account/
///
/// Ends every session of the account, so the cookie is cleared too.
async fn deactivate_account(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    FormBody(form): FormBody<DeactivateForm>,
) -> Result<Response, ApiError> {
    let confirm = checked(form.deactivate_profile.as_deref());
    state.user_service.deactivate_account(&user, confirm).await?;
    with_cookie(found("/"), CLEAR_COOKIE)
}

/// POST /update_description/
async fn update_description(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    FormBody(form): FormBody<DescriptionForm>,
) -> Result<Response, ApiError> {
    state
        .user_service
        .update_description(&user, form.description)
        .await?;
    Ok(found(DASHBOARD_PATH))
}

/// POST /update_flair/
async fn update_flair(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    FormBody(form): FormBody<FlairForm>,
) -> Result<Response, ApiError> {
    state
        .professional_service
        .update_flair(&user, &form.flair)
        .await?;
    Ok(found(DASHBOARD_PATH))
}

/// POST /update_education/
async fn update_education(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    FormBody(form): FormBody<EducationForm>,
) -> Result<Response, ApiError> {
    let input = EducationInput {
        id: form.id,
        school_name: form.school_name,
        degree: form.degree,
        start_date: form.start_date,
        end_date: form.end_date,
    };
    state.professional_service.save_education(&user, input).await?;
    Ok(found(DASHBOARD_PATH))
}

/// POST /update_employments/
async fn update_employment(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user)): Extension<AuthenticatedUser>,
    FormBody(form): FormBody<EmploymentForm>,
) -> Result<Response, ApiError> {
    let input = EmploymentInput {
        id: form.id,
        company: form.company,
        position: form.position,
        start_date: form.start_date,
        end_date: form.end_date,
    };
    state
        .professional_service
        .save_employment(&user, input)
        .await?;
    Ok(found(DASHBOARD_PATH))
}
