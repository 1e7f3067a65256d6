//! Authenticated identities as seen by the admin panel.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use time::OffsetDateTime;

use super::error::DomainError;

/// Closed set of roles issued by the auth provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Coach,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Member, Role::Coach, Role::Admin, Role::SuperAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Coach => "coach",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "member" => Ok(Role::Member),
            "coach" => Ok(Role::Coach),
            "admin" => Ok(Role::Admin),
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            other => Err(DomainError::UnknownRole(other.to_string())),
        }
    }
}

/// Read-only view of an externally issued session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub identity: String,
    pub role: Role,
    pub email: Option<String>,
    pub name: Option<String>,
    #[serde(skip)]
    pub expires_at: Option<OffsetDateTime>,
}

impl Session {
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
            email: None,
            name: None,
            expires_at: None,
        }
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }
}

/// Outcome of resolving a session token. Absence of a session is an ordinary
/// state, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSession {
    Authenticated(Session),
    /// The provider still knows the identity but its session has lapsed.
    Expired { identity: String },
    Anonymous,
}

impl ResolvedSession {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, ResolvedSession::Authenticated(_))
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            ResolvedSession::Authenticated(session) => Some(session),
            ResolvedSession::Expired { .. } | ResolvedSession::Anonymous => None,
        }
    }
}
