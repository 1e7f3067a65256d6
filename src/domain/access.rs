//! Views of the admin panel and the roles allowed to see them.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::session::Role;

/// Protected views. Every guarded route maps onto exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Dashboard,
    GymDirectory,
    GymAdmin,
    CoachAvailability,
    CoachRevenue,
    CoachProfile,
    PlatformSettings,
}

impl View {
    pub const ALL: [View; 7] = [
        View::Dashboard,
        View::GymDirectory,
        View::GymAdmin,
        View::CoachAvailability,
        View::CoachRevenue,
        View::CoachProfile,
        View::PlatformSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            View::Dashboard => "dashboard",
            View::GymDirectory => "gym_directory",
            View::GymAdmin => "gym_admin",
            View::CoachAvailability => "coach_availability",
            View::CoachRevenue => "coach_revenue",
            View::CoachProfile => "coach_profile",
            View::PlatformSettings => "platform_settings",
        }
    }
}

/// Explicit view → roles table consulted by the route guard.
#[derive(Debug, Clone)]
pub struct PermissionTable {
    allowed: HashMap<View, HashSet<Role>>,
}

impl PermissionTable {
    pub fn empty() -> Self {
        Self {
            allowed: HashMap::new(),
        }
    }

    pub fn grant(mut self, view: View, roles: &[Role]) -> Self {
        self.allowed
            .entry(view)
            .or_default()
            .extend(roles.iter().copied());
        self
    }

    pub fn permits(&self, role: Role, view: View) -> bool {
        self.allowed
            .get(&view)
            .is_some_and(|roles| roles.contains(&role))
    }

    pub fn views_for(&self, role: Role) -> Vec<View> {
        View::ALL
            .into_iter()
            .filter(|view| self.permits(role, *view))
            .collect()
    }
}

impl Default for PermissionTable {
    fn default() -> Self {
        use Role::*;

        Self::empty()
            .grant(View::Dashboard, &[Member, Coach, Admin, SuperAdmin])
            .grant(View::GymDirectory, &[Coach, Admin, SuperAdmin])
            .grant(View::GymAdmin, &[Admin, SuperAdmin])
            .grant(View::CoachAvailability, &[Coach, Admin, SuperAdmin])
            .grant(View::CoachRevenue, &[Coach, Admin, SuperAdmin])
            .grant(View::CoachProfile, &[Coach, Admin, SuperAdmin])
            .grant(View::PlatformSettings, &[SuperAdmin])
    }
}
