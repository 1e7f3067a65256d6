//! Route guard evaluated before any protected view renders.

use tracing::{debug, info};

use crate::domain::access::{PermissionTable, View};
use crate::domain::session::{ResolvedSession, Session};

use super::session::SessionResolver;

pub const LOGIN_PATH: &str = "/login";
pub const ACCESS_DENIED_PATH: &str = "/access-denied";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Unchecked,
    Authenticated(Session),
    Unauthenticated,
    Unauthorized(Session),
}

/// The single rendering decision derived from a terminal guard state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Render(Session),
    RedirectToLogin { callback: String },
    RedirectToAccessDenied,
}

impl GuardOutcome {
    /// Location header value for redirect outcomes.
    pub fn location(&self) -> Option<String> {
        match self {
            GuardOutcome::Render(_) => None,
            GuardOutcome::RedirectToLogin { callback } => {
                let mut url = format!("{LOGIN_PATH}?");
                url.push_str(
                    &url::form_urlencoded::Serializer::new(String::new())
                        .append_pair("callbackUrl", callback)
                        .finish(),
                );
                Some(url)
            }
            GuardOutcome::RedirectToAccessDenied => Some(ACCESS_DENIED_PATH.to_string()),
        }
    }
}

impl GuardState {
    /// Leave `Unchecked` given a resolved session. Terminal states are returned
    /// unchanged.
    pub fn advance(self, resolved: ResolvedSession, view: View, table: &PermissionTable) -> Self {
        if !matches!(self, GuardState::Unchecked) {
            return self;
        }
        match resolved {
            ResolvedSession::Anonymous | ResolvedSession::Expired { .. } => {
                GuardState::Unauthenticated
            }
            ResolvedSession::Authenticated(session) if table.permits(session.role, view) => {
                GuardState::Authenticated(session)
            }
            ResolvedSession::Authenticated(session) => GuardState::Unauthorized(session),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GuardState::Unchecked)
    }

    /// `None` while the state is still `Unchecked`.
    pub fn outcome(self, requested_path: &str) -> Option<GuardOutcome> {
        match self {
            GuardState::Unchecked => None,
            GuardState::Authenticated(session) => Some(GuardOutcome::Render(session)),
            GuardState::Unauthenticated => Some(GuardOutcome::RedirectToLogin {
                callback: requested_path.to_string(),
            }),
            GuardState::Unauthorized(_) => Some(GuardOutcome::RedirectToAccessDenied),
        }
    }
}

#[derive(Clone)]
pub struct RouteGuard {
    resolver: SessionResolver,
    permissions: PermissionTable,
}

impl RouteGuard {
    pub fn new(resolver: SessionResolver, permissions: PermissionTable) -> Self {
        Self {
            resolver,
            permissions,
        }
    }

    pub fn permissions(&self) -> &PermissionTable {
        &self.permissions
    }

    pub fn resolver(&self) -> &SessionResolver {
        &self.resolver
    }

    /// Decide the outcome for an already resolved session.
    pub fn authorize(
        &self,
        resolved: ResolvedSession,
        view: View,
        requested_path: &str,
    ) -> GuardOutcome {
        let state = GuardState::Unchecked.advance(resolved, view, &self.permissions);
        match &state {
            GuardState::Authenticated(session) => debug!(
                target = "gymdesk::guard",
                view = view.as_str(),
                identity = %session.identity,
                "access granted"
            ),
            GuardState::Unauthorized(session) => info!(
                target = "gymdesk::guard",
                view = view.as_str(),
                identity = %session.identity,
                role = %session.role,
                "access denied"
            ),
            GuardState::Unauthenticated => debug!(
                target = "gymdesk::guard",
                view = view.as_str(),
                path = requested_path,
                "redirecting anonymous request to login"
            ),
            GuardState::Unchecked => {}
        }
        // `advance` from Unchecked always lands on a terminal state.
        state
            .outcome(requested_path)
            .unwrap_or(GuardOutcome::RedirectToLogin {
                callback: requested_path.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::session::Role;

    fn session(role: Role) -> ResolvedSession {
        ResolvedSession::Authenticated(Session::new("u-1", role))
    }

    #[test]
    fn anonymous_becomes_unauthenticated() {
        let state = GuardState::Unchecked.advance(
            ResolvedSession::Anonymous,
            View::CoachAvailability,
            &PermissionTable::default(),
        );
        assert_eq!(state, GuardState::Unauthenticated);
        assert_eq!(
            state.outcome("/coach/availability"),
            Some(GuardOutcome::RedirectToLogin {
                callback: "/coach/availability".to_string()
            })
        );
    }

    #[test]
    fn lapsed_session_is_sent_to_login() {
        let state = GuardState::Unchecked.advance(
            ResolvedSession::Expired {
                identity: "u-1".to_string(),
            },
            View::Dashboard,
            &PermissionTable::default(),
        );
        assert_eq!(state, GuardState::Unauthenticated);
        assert!(matches!(
            state.outcome("/dashboard"),
            Some(GuardOutcome::RedirectToLogin { .. })
        ));
    }

    #[test]
    fn member_on_admin_view_is_unauthorized() {
        let state = GuardState::Unchecked.advance(
            session(Role::Member),
            View::GymAdmin,
            &PermissionTable::default(),
        );
        assert!(matches!(state, GuardState::Unauthorized(_)));
        assert_eq!(
            state.outcome("/admin/gyms"),
            Some(GuardOutcome::RedirectToAccessDenied)
        );
    }

    #[test]
    fn permitted_role_renders() {
        let state = GuardState::Unchecked.advance(
            session(Role::Admin),
            View::GymAdmin,
            &PermissionTable::default(),
        );
        assert!(matches!(
            state.outcome("/admin/gyms"),
            Some(GuardOutcome::Render(s)) if s.role == Role::Admin
        ));
    }

    #[test]
    fn terminal_states_do_not_advance() {
        let state = GuardState::Unauthenticated.advance(
            session(Role::SuperAdmin),
            View::Dashboard,
            &PermissionTable::default(),
        );
        assert_eq!(state, GuardState::Unauthenticated);
        assert!(state.is_terminal());
        assert_eq!(GuardState::Unchecked.outcome("/"), None);
    }

    #[test]
    fn login_location_encodes_callback() {
        let outcome = GuardOutcome::RedirectToLogin {
            callback: "/admin/gyms/g 1?tab=info".to_string(),
        };
        assert_eq!(
            outcome.location().as_deref(),
            Some("/login?callbackUrl=%2Fadmin%2Fgyms%2Fg+1%3Ftab%3Dinfo")
        );
        assert_eq!(
            GuardOutcome::RedirectToAccessDenied.location().as_deref(),
            Some("/access-denied")
        );
    }
}
