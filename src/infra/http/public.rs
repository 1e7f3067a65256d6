use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::HttpState;
use super::error::{ErrorCode, ViewError};

const DEFAULT_CALLBACK: &str = "/dashboard";

#[derive(Debug, Serialize)]
pub(super) struct HealthBody {
    status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
}

/// Liveness probe. Never touches sessions or caches.
pub(super) async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "healthy",
        timestamp: OffsetDateTime::now_utc(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct LoginQuery {
    #[serde(rename = "callbackUrl")]
    callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct LoginView {
    view: &'static str,
    callback_url: String,
    sign_in_url: String,
}

pub(super) async fn login(
    State(state): State<HttpState>,
    Query(query): Query<LoginQuery>,
) -> Json<LoginView> {
    let callback_url = local_callback(query.callback_url.as_deref());

    let mut sign_in = state.auth_url.clone();
    if let Ok(mut segments) = sign_in.path_segments_mut() {
        segments.pop_if_empty().extend(["api", "auth", "signin"]);
    }
    sign_in
        .query_pairs_mut()
        .append_pair("callbackUrl", &callback_url);

    Json(LoginView {
        view: "login",
        callback_url,
        sign_in_url: sign_in.to_string(),
    })
}

/// Only same-origin paths are accepted as post-login destinations.
fn local_callback(candidate: Option<&str>) -> String {
    match candidate {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => DEFAULT_CALLBACK.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub(super) struct AccessDeniedView {
    view: &'static str,
    message: &'static str,
}

pub(super) async fn access_denied() -> Json<AccessDeniedView> {
    Json(AccessDeniedView {
        view: "access_denied",
        message: "You do not have permission to view this page",
    })
}

pub(super) async fn not_found() -> Response {
    ViewError::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, "Page not found").into_response()
}
