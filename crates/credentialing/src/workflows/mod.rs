//! Screening workflow and professional versioning.

pub mod professionals;
pub mod screening;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::ids::UserId;

/// Header carrying the acting user on mutating requests.
pub const ACTOR_HEADER: &str = "x-user-id";

pub(crate) fn actor_from(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(UserId::new)
}

pub(crate) fn missing_actor() -> Response {
    let payload = json!({
        "error": format!("missing {ACTOR_HEADER} header"),
    });
    (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
}
