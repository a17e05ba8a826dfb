//! Common API utilities and shared types
//!
//! This module contains shared utilities used across multiple API endpoints.

use axum::{
    extract::FromRequest,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

use crate::api::middleware::ApiError;

/// `application/x-www-form-urlencoded` body whose rejections use the API
/// error envelope
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Form), rejection(ApiError))]
pub struct FormBody<T>(pub T);

/// `?page=` as sent by the client. Anything that is not an integer means page 1.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn page(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(1)
    }
}

/// 302 redirect to `location`
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => ApiError::internal_error("Invalid redirect target").into_response(),
    }
}

/// Whether an HTML checkbox value counts as ticked
pub fn checked(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("on" | "true" | "1" | "yes")
    )
}

/// Treat an empty form field as absent
pub fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Path of a post's detail page
pub fn post_path(slug: &str) -> String {
    format!("/forum/post/{}/", urlencoding::encode(slug))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_falls_back_to_first_page() {
        let page = |p: Option<&str>| PageQuery { page: p.map(str::to_string) }.page();
        assert_eq!(page(None), 1);
        assert_eq!(page(Some("3")), 3);
        assert_eq!(page(Some("abc")), 1);
        assert_eq!(page(Some("")), 1);
    }

    #[test]
    fn test_checked_values() {
        assert!(checked(Some("on")));
        assert!(checked(Some("True")));
        assert!(!checked(Some("off")));
        assert!(!checked(None));
    }

    #[test]
    fn test_found_sets_location() {
        let response = found("/forum/");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/forum/");
    }
}
