//! Session resolution over an external auth provider.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use gymdesk_api_types::SessionPayload;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::domain::session::{ResolvedSession, Role, Session};

/// Opaque credential issued by the auth provider.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Returns `None` for blank tokens.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

#[derive(Debug, Error)]
pub enum AuthProviderError {
    #[error("auth provider unreachable: {0}")]
    Transport(String),
    #[error("auth provider returned {status}")]
    Status { status: u16 },
    #[error("failed to decode session payload: {0}")]
    Decode(String),
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Look up the session behind `token`. `Ok(None)` means no session.
    async fn current_session(
        &self,
        token: &SessionToken,
    ) -> Result<Option<SessionPayload>, AuthProviderError>;
}

/// Adapter turning provider payloads into [`ResolvedSession`]s.
///
/// Callers never see an error: a lapsed session is reported as
/// [`ResolvedSession::Expired`] and every other failure collapses to
/// [`ResolvedSession::Anonymous`].
#[derive(Clone)]
pub struct SessionResolver {
    provider: Arc<dyn AuthProvider>,
}

impl SessionResolver {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self { provider }
    }

    pub async fn resolve(&self, token: Option<&SessionToken>) -> ResolvedSession {
        self.resolve_at(token, OffsetDateTime::now_utc()).await
    }

    pub async fn resolve_at(
        &self,
        token: Option<&SessionToken>,
        now: OffsetDateTime,
    ) -> ResolvedSession {
        let Some(token) = token else {
            return ResolvedSession::Anonymous;
        };

        let payload = match self.provider.current_session(token).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(target = "gymdesk::session", "no session for token");
                return ResolvedSession::Anonymous;
            }
            Err(err) => {
                warn!(
                    target = "gymdesk::session",
                    error = %err,
                    "session lookup failed; treating request as anonymous"
                );
                return ResolvedSession::Anonymous;
            }
        };

        match session_from_payload(payload) {
            Some(session) if session.is_expired_at(now) => {
                debug!(
                    target = "gymdesk::session",
                    identity = %session.identity,
                    "session expired"
                );
                ResolvedSession::Expired {
                    identity: session.identity,
                }
            }
            Some(session) => ResolvedSession::Authenticated(session),
            None => ResolvedSession::Anonymous,
        }
    }
}

fn session_from_payload(payload: SessionPayload) -> Option<Session> {
    let user = payload.user?;
    if user.id.trim().is_empty() {
        return None;
    }
    let role = match user.role.parse::<Role>() {
        Ok(role) => role,
        Err(err) => {
            warn!(
                target = "gymdesk::session",
                identity = %user.id,
                error = %err,
                "session carries unrecognised role"
            );
            return None;
        }
    };

    let mut session = Session::new(user.id, role);
    session.email = user.email;
    session.name = user.name;
    session.expires_at = payload.expires;
    Some(session)
}
