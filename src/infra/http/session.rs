use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use tracing::info;

use crate::application::guard::LOGIN_PATH;
use crate::domain::session::ResolvedSession;

use super::HttpState;
use super::middleware::{SessionContext, extract_token};

/// End the caller's session: tear down its query cache and clear the cookie.
pub(super) async fn logout(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let token = extract_token(&headers, &state.session_cookie);
    let resolved = state.guard.resolver().resolve(token.as_ref()).await;
    let identity = match resolved {
        ResolvedSession::Authenticated(session) => Some(session.identity),
        ResolvedSession::Expired { identity } => Some(identity),
        ResolvedSession::Anonymous => None,
    };
    if let Some(identity) = identity {
        let dropped = state.caches.end_session(&identity);
        info!(
            target = "gymdesk::http::session",
            identity = %identity,
            cache_dropped = dropped,
            "session logged out"
        );
    }

    let mut response = Redirect::to(LOGIN_PATH).into_response();
    let expired = format!(
        "{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax",
        state.session_cookie
    );
    if let Ok(value) = HeaderValue::from_str(&expired) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

#[derive(Debug, Serialize)]
pub(super) struct FocusResult {
    enabled: bool,
    refetched: usize,
}

/// Foreground-focus beacon from the browser.
pub(super) async fn focus(
    State(state): State<HttpState>,
    Extension(ctx): Extension<SessionContext>,
) -> Json<FocusResult> {
    let enabled = state.caches.config().refetch_on_window_focus;
    let refetched = state
        .caches
        .get(&ctx.session.identity)
        .map_or(0, |client| client.on_focus());
    Json(FocusResult { enabled, refetched })
}
