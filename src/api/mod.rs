//! API layer - HTTP handlers and routing
//!
//! Route groups:
//! - Forum listing, detail, search and latest feed (public)
//! - Forum writes (login + ban gate)
//! - Chatbot process and session housekeeping
//! - Registration and login forms
//! - Dashboard, profile and moderation (login + ban gate)

pub mod auth;
pub mod chatbot;
pub mod common;
pub mod dashboard;
pub mod forum;
pub mod middleware;
pub mod users;


use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Build the route table without outer layers
pub fn build_app_router() -> Router<AppState> {
    // Login and ban gates; route_layer runs the last one added first
    let gated = Router::new()
        .merge(forum::protected_router())
        .merge(chatbot::protected_router())
        .merge(dashboard::router())
        .merge(users::router())
        .route_layer(axum_middleware::from_fn(middleware::ban_forbidden))
        .route_layer(axum_middleware::from_fn(middleware::require_auth));

    // Banned users must still be able to read why
    let banned = users::banned_router()
        .route_layer(axum_middleware::from_fn(middleware::require_auth));

    let chatbot = chatbot::public_router()
        .route_layer(axum_middleware::from_fn(middleware::ban_forbidden));

    Router::new()
        .merge(forum::public_router())
        .merge(auth::router())
        .merge(chatbot)
        .merge(gated)
        .merge(banned)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin '{}'", cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Ok(build_app_router()
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
