use std::sync::Arc;

use gymdesk_api_types::{CoachProfile, CoachProfileUpdate};

use super::{ResourceError, read_query};
use crate::application::api::GymApi;
use crate::cache::{QueryClient, QueryState, keys::coaches};
use crate::domain::validation::validate_coach_profile;

#[derive(Clone)]
pub struct CoachProfileResource {
    client: QueryClient,
    api: Arc<dyn GymApi>,
}

impl CoachProfileResource {
    pub fn new(client: QueryClient, api: Arc<dyn GymApi>) -> Self {
        Self { client, api }
    }

    pub async fn my_profile(&self) -> QueryState<CoachProfile> {
        let api = Arc::clone(&self.api);
        read_query(&self.client, coaches::my_profile(), move || {
            let api = Arc::clone(&api);
            async move { api.my_coach_profile().await }
        })
        .await
    }

    pub async fn update(&self, update: CoachProfileUpdate) -> Result<CoachProfile, ResourceError> {
        validate_coach_profile(&update)?;
        let api = Arc::clone(&self.api);
        let profile = self
            .client
            .mutate("update_coach_profile", vec![coaches::profile()], || {
                api.update_coach_profile(&update)
            })
            .await?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resources::fake::FakeApi;
    use crate::cache::{CacheConfig, keys::coaches as keys};

    #[tokio::test(start_paused = true)]
    async fn update_invalidates_profile_but_not_availability() {
        let client = QueryClient::new(CacheConfig::default());
        let resource = CoachProfileResource::new(client.clone(), Arc::new(FakeApi::default()));
        client.set_query_data(&keys::my_availability(None), Vec::<u8>::new());

        let profile = resource
            .update(CoachProfileUpdate {
                bio: Some("Strength coach".to_string()),
                specialties: vec!["powerlifting".to_string()],
                hourly_rate_cents: Some(6_000),
            })
            .await
            .unwrap();
        assert_eq!(profile.hourly_rate_cents, Some(6_000));

        let state = resource.my_profile().await;
        assert_eq!(state.data.unwrap().bio.as_deref(), Some("Strength coach"));
        assert!(
            !client
                .get_query_state::<Vec<u8>>(&keys::my_availability(None))
                .is_stale
        );
    }

    #[tokio::test(start_paused = true)]
    async fn negative_rate_is_rejected() {
        let resource =
            CoachProfileResource::new(QueryClient::new(CacheConfig::default()), Arc::new(FakeApi::default()));
        let err = resource
            .update(CoachProfileUpdate {
                bio: None,
                specialties: Vec::new(),
                hourly_rate_cents: Some(-1),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::Validation(_)));
    }
}
