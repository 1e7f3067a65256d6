use std::sync::Arc;

use gymdesk_api_types::{Gym, GymInput, GymListParams, GymPage};

use super::{ResourceError, read_query};
use crate::application::api::GymApi;
use crate::cache::{QueryClient, QueryState, keys::gyms};
use crate::domain::validation::validate_gym;

/// Gym directory reads and admin writes.
///
/// Every write invalidates `gyms.all`, which covers both list pages and
/// detail entries.
#[derive(Clone)]
pub struct GymResource {
    client: QueryClient,
    api: Arc<dyn GymApi>,
}

impl GymResource {
    pub fn new(client: QueryClient, api: Arc<dyn GymApi>) -> Self {
        Self { client, api }
    }

    pub async fn list(&self, params: GymListParams) -> QueryState<GymPage> {
        let key = gyms::list(&params);
        let api = Arc::clone(&self.api);
        read_query(&self.client, key, move || {
            let api = Arc::clone(&api);
            let params = params.clone();
            async move { api.list_gyms(&params).await }
        })
        .await
    }

    pub async fn detail(&self, id: &str) -> QueryState<Gym> {
        let key = gyms::detail(id);
        let api = Arc::clone(&self.api);
        let id = id.to_string();
        read_query(&self.client, key, move || {
            let api = Arc::clone(&api);
            let id = id.clone();
            async move { api.gym(&id).await }
        })
        .await
    }

    pub async fn create(&self, input: GymInput) -> Result<Gym, ResourceError> {
        validate_gym(&input)?;
        let api = Arc::clone(&self.api);
        let gym = self
            .client
            .mutate("create_gym", vec![gyms::all()], || api.create_gym(&input))
            .await?;
        Ok(gym)
    }

    pub async fn update(&self, id: &str, input: GymInput) -> Result<Gym, ResourceError> {
        validate_gym(&input)?;
        let api = Arc::clone(&self.api);
        let gym = self
            .client
            .mutate("update_gym", vec![gyms::all()], || api.update_gym(id, &input))
            .await?;
        Ok(gym)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ResourceError> {
        let api = Arc::clone(&self.api);
        self.client
            .mutate("delete_gym", vec![gyms::all()], || api.delete_gym(id))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resources::fake::FakeApi;
    use crate::cache::{CacheConfig, QueryStatus, keys::coaches};

    fn input(name: &str) -> GymInput {
        GymInput {
            name: name.to_string(),
            is_active: true,
            ..GymInput::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn create_refreshes_lists_only_within_gym_namespace() {
        let api = Arc::new(FakeApi::default());
        let client = QueryClient::new(CacheConfig::default());
        let resource = GymResource::new(client.clone(), api.clone());

        client.set_query_data(&coaches::my_profile(), 1u8);
        let empty = resource.list(GymListParams::default()).await;
        assert_eq!(empty.data.unwrap().total, 0);

        resource.create(input("Iron Temple")).await.unwrap();
        let listed = resource.list(GymListParams::default()).await;
        assert_eq!(listed.data.unwrap().items[0].name, "Iron Temple");
        assert_eq!(FakeApi::calls(&api.gym_list_calls), 2);

        assert!(!client.get_query_state::<u8>(&coaches::my_profile()).is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_input_is_rejected_locally() {
        let api = Arc::new(FakeApi::default());
        let resource = GymResource::new(QueryClient::new(CacheConfig::default()), api.clone());

        let err = resource.create(input("X")).await.unwrap_err();
        assert!(matches!(err, ResourceError::Validation(ref e) if e.message_for("name").is_some()));
        assert!(api.gyms.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_gym_surfaces_remote_status() {
        let resource = GymResource::new(
            QueryClient::new(CacheConfig {
                query_retry: crate::cache::RetryPolicy::no_retry(),
                ..CacheConfig::default()
            }),
            Arc::new(FakeApi::default()),
        );

        let state = resource.detail("nope").await;
        assert_eq!(state.status, QueryStatus::Error);
        let error = state.error.unwrap();
        let api_error = error.cause_as::<crate::application::api::ApiError>().unwrap();
        assert_eq!(api_error.status_code(), Some(404));
    }

    #[tokio::test(start_paused = true)]
    async fn update_refreshes_detail() {
        let api = Arc::new(FakeApi::default());
        let resource = GymResource::new(QueryClient::new(CacheConfig::default()), api.clone());
        let created = resource.create(input("Iron Temple")).await.unwrap();

        let before = resource.detail(&created.id).await;
        assert_eq!(before.data.unwrap().name, "Iron Temple");

        resource
            .update(&created.id, input("Iron Temple Annex"))
            .await
            .unwrap();
        let after = resource.detail(&created.id).await;
        assert_eq!(after.data.unwrap().name, "Iron Temple Annex");
    }
}
