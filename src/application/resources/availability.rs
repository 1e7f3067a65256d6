use std::sync::Arc;

use futures::future::BoxFuture;
use gymdesk_api_types::{AvailabilitySlot, SetAvailabilityRequest};

use super::{ResourceError, read_query};
use crate::application::api::{ApiError, GymApi};
use crate::cache::{QueryClient, QueryObserver, QueryState, keys::coaches};
use crate::domain::validation::validate_availability;

/// The signed-in coach's weekly availability.
#[derive(Clone)]
pub struct AvailabilityResource {
    client: QueryClient,
    api: Arc<dyn GymApi>,
}

impl AvailabilityResource {
    pub fn new(client: QueryClient, api: Arc<dyn GymApi>) -> Self {
        Self { client, api }
    }

    pub async fn my_availability(&self, gym_id: Option<&str>) -> QueryState<Vec<AvailabilitySlot>> {
        let fetch = fetcher(Arc::clone(&self.api), gym_id.map(str::to_owned));
        read_query(&self.client, coaches::my_availability(gym_id), fetch).await
    }

    /// Keep `my_availability` observed so invalidations refetch it eagerly.
    pub fn watch_my_availability(
        &self,
        gym_id: Option<&str>,
    ) -> QueryObserver<Vec<AvailabilitySlot>> {
        self.client.subscribe(
            coaches::my_availability(gym_id),
            fetcher(Arc::clone(&self.api), gym_id.map(str::to_owned)),
        )
    }

    pub async fn set_availability(
        &self,
        request: SetAvailabilityRequest,
    ) -> Result<AvailabilitySlot, ResourceError> {
        validate_availability(&request)?;
        let api = Arc::clone(&self.api);
        let slot = self
            .client
            .mutate("set_availability", vec![coaches::availability()], || {
                api.set_availability(&request)
            })
            .await?;
        Ok(slot)
    }

    pub async fn delete_availability(&self, gym_id: Option<&str>) -> Result<(), ResourceError> {
        let api = Arc::clone(&self.api);
        self.client
            .mutate("delete_availability", vec![coaches::availability()], || {
                api.delete_availability(gym_id)
            })
            .await?;
        Ok(())
    }
}

fn fetcher(
    api: Arc<dyn GymApi>,
    gym_id: Option<String>,
) -> impl Fn() -> BoxFuture<'static, Result<Vec<AvailabilitySlot>, ApiError>> + Send + Sync + 'static
{
    move || {
        let api = Arc::clone(&api);
        let gym_id = gym_id.clone();
        Box::pin(async move { api.my_availability(gym_id.as_deref()).await })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gymdesk_api_types::DayOfWeek;

    use super::*;
    use crate::application::resources::fake::FakeApi;
    use crate::cache::{CacheConfig, QueryStatus, RetryPolicy};
    use crate::domain::validation::END_BEFORE_START;

    fn request(gym: &str, start: &str, end: &str) -> SetAvailabilityRequest {
        SetAvailabilityRequest {
            gym_id: gym.to_string(),
            day_of_week: DayOfWeek::Monday,
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    fn resource(api: Arc<FakeApi>) -> AvailabilityResource {
        let config = CacheConfig {
            query_retry: RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40)),
            ..CacheConfig::default()
        };
        AvailabilityResource::new(QueryClient::new(config), api)
    }

    #[tokio::test(start_paused = true)]
    async fn set_availability_is_visible_on_next_read() {
        let api = Arc::new(FakeApi::default());
        let resource = resource(Arc::clone(&api));

        let before = resource.my_availability(Some("g1")).await;
        assert!(before.is_success());
        assert!(before.data.as_deref().unwrap().is_empty());

        let slot = resource
            .set_availability(request("g1", "09:00", "10:00"))
            .await
            .expect("slot saved");
        assert_eq!(slot.gym_id, "g1");

        let after = resource.my_availability(Some("g1")).await;
        let slots = after.data.expect("data present");
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start_time, "09:00");
        assert_eq!(slots[0].day_of_week, DayOfWeek::Monday);
        assert_eq!(FakeApi::calls(&api.availability_calls), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reversed_times_never_reach_the_api() {
        let api = Arc::new(FakeApi::default());
        let resource = resource(Arc::clone(&api));

        let err = resource
            .set_availability(request("g1", "10:00", "09:00"))
            .await
            .expect_err("validation must fail");
        match err {
            ResourceError::Validation(errors) => {
                assert_eq!(errors.message_for("end_time"), Some(END_BEFORE_START));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(api.slots.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn observed_reads_refetch_after_delete() {
        let api = Arc::new(FakeApi::default());
        let resource = resource(Arc::clone(&api));
        resource
            .set_availability(request("g1", "09:00", "10:00"))
            .await
            .unwrap();

        let mut observer = resource.watch_my_availability(None);
        let first = observer.settled().await;
        assert_eq!(first.data.unwrap().len(), 1);

        resource.delete_availability(Some("g1")).await.unwrap();
        let refreshed = observer.settled().await;
        assert!(refreshed.data.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_read_surfaces_error_state() {
        let api = Arc::new(FakeApi::default());
        api.fail_reads.store(3, std::sync::atomic::Ordering::SeqCst);
        let resource = resource(Arc::clone(&api));

        let state = resource.my_availability(None).await;
        assert_eq!(state.status, QueryStatus::Error);
        assert!(state.data.is_none());
        let error = state.error.expect("error surfaced");
        assert_eq!(error.attempts(), 3);
        assert_eq!(FakeApi::calls(&api.availability_calls), 3);
    }
}
