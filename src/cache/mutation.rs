//! Ephemeral records for in-flight mutations.

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::keys::QueryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    Idle,
    Pending,
    Success,
    Error,
}

/// Lives only while its mutation runs. On success every prefix in
/// `invalidates` is invalidated.
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub id: Uuid,
    pub name: &'static str,
    pub status: MutationStatus,
    pub invalidates: Vec<QueryKey>,
}

impl MutationRecord {
    pub fn new(name: &'static str, invalidates: Vec<QueryKey>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            status: MutationStatus::Idle,
            invalidates,
        }
    }

    pub(crate) fn transition(&mut self, next: MutationStatus) {
        debug!(
            mutation = self.name,
            mutation_id = %self.id,
            from = ?self.status,
            to = ?next,
            "mutation status changed"
        );
        self.status = next;
    }
}
