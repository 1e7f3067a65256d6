use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::{
    error::ErrorReport,
    guard::GuardOutcome,
    resources::Resources,
    session::SessionToken,
};
use crate::domain::{
    access::View,
    session::{ResolvedSession, Session},
};

use super::HttpState;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Route state for the guard middleware: which view the routes belong to.
#[derive(Clone)]
pub struct GuardedView {
    pub state: HttpState,
    pub view: View,
}

/// Inserted into request extensions once the guard lets a request through.
#[derive(Clone)]
pub struct SessionContext {
    pub session: Session,
    pub token: SessionToken,
    pub resources: Resources,
}

/// Session token from the auth cookie, falling back to a bearer header.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<SessionToken> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .and_then(|(_, value)| SessionToken::new(value));

    from_cookie.or_else(|| {
        let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let bearer = raw.strip_prefix("Bearer ")?;
        SessionToken::new(bearer)
    })
}

pub async fn require_view(
    State(guarded): State<GuardedView>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let GuardedView { state, view } = guarded;
    let token = extract_token(request.headers(), &state.session_cookie);
    let requested = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let resolved = state.guard.resolver().resolve(token.as_ref()).await;
    if let ResolvedSession::Expired { identity } = &resolved {
        state.caches.end_session(identity);
    }
    let outcome = state.guard.authorize(resolved, view, &requested);
    let session = match outcome {
        GuardOutcome::Render(session) => session,
        redirect => return redirect_response(&redirect),
    };
    // Render implies a resolved session, which implies a token.
    let Some(token) = token else {
        return redirect_response(&GuardOutcome::RedirectToLogin {
            callback: requested,
        });
    };

    let client = state.caches.open(&session);
    let api = state.connector.connect(&token);
    request.extensions_mut().insert(SessionContext {
        session,
        token,
        resources: Resources::new(client, api),
    });

    next.run(request).await
}

pub(super) fn redirect_response(outcome: &GuardOutcome) -> Response {
    match outcome.location() {
        Some(location) => Redirect::to(&location).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "gymdesk::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "gymdesk::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    const COOKIE: &str = "next-auth.session-token";

    #[test]
    fn token_is_read_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; next-auth.session-token=abc123; other=1"),
        );
        let token = extract_token(&headers, COOKIE).expect("token");
        assert_eq!(token.expose(), "abc123");
    }

    #[test]
    fn bearer_header_is_a_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(extract_token(&headers, COOKIE).unwrap().expose(), "xyz");
    }

    #[test]
    fn missing_or_blank_token_is_none() {
        let mut headers = HeaderMap::new();
        assert!(extract_token(&headers, COOKIE).is_none());
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("next-auth.session-token="),
        );
        assert!(extract_token(&headers, COOKIE).is_none());
    }

    #[test]
    fn redirects_use_see_other() {
        let response = redirect_response(&GuardOutcome::RedirectToAccessDenied);
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/access-denied"
        );
    }
}
