//! Contract for the remote gym-management REST API.
//!
//! Resource hooks depend only on [`GymApi`]; the reqwest adapter in
//! `infra::api_client` is one implementation and tests supply in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use gymdesk_api_types::{
    AvailabilitySlot, CoachProfile, CoachProfileUpdate, Gym, GymInput, GymListParams, GymPage,
    RevenueParams, RevenueStats, SetAvailabilityRequest,
};
use thiserror::Error;

use super::session::SessionToken;

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("request to remote API failed: {0}")]
    Transport(String),
    #[error("remote API returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode remote API response: {0}")]
    Decode(String),
    #[error("invalid remote API url: {0}")]
    Url(String),
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[async_trait]
pub trait GymApi: Send + Sync {
    async fn my_availability(&self, gym_id: Option<&str>)
    -> Result<Vec<AvailabilitySlot>, ApiError>;

    async fn set_availability(
        &self,
        request: &SetAvailabilityRequest,
    ) -> Result<AvailabilitySlot, ApiError>;

    async fn delete_availability(&self, gym_id: Option<&str>) -> Result<(), ApiError>;

    async fn my_revenue(&self, params: &RevenueParams) -> Result<RevenueStats, ApiError>;

    async fn list_gyms(&self, params: &GymListParams) -> Result<GymPage, ApiError>;

    async fn gym(&self, id: &str) -> Result<Gym, ApiError>;

    async fn create_gym(&self, input: &GymInput) -> Result<Gym, ApiError>;

    async fn update_gym(&self, id: &str, input: &GymInput) -> Result<Gym, ApiError>;

    async fn delete_gym(&self, id: &str) -> Result<(), ApiError>;

    async fn my_coach_profile(&self) -> Result<CoachProfile, ApiError>;

    async fn update_coach_profile(
        &self,
        update: &CoachProfileUpdate,
    ) -> Result<CoachProfile, ApiError>;
}

/// Produces an API client that acts on behalf of one session.
pub trait GymApiConnector: Send + Sync {
    fn connect(&self, token: &SessionToken) -> Arc<dyn GymApi>;
}
