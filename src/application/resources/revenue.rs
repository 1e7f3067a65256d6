use std::sync::Arc;

use gymdesk_api_types::{RevenueParams, RevenueStats};

use super::read_query;
use crate::application::api::GymApi;
use crate::cache::{QueryClient, QueryState, keys::coaches};

/// Read-only revenue statistics for the signed-in coach.
#[derive(Clone)]
pub struct RevenueResource {
    client: QueryClient,
    api: Arc<dyn GymApi>,
}

impl RevenueResource {
    pub fn new(client: QueryClient, api: Arc<dyn GymApi>) -> Self {
        Self { client, api }
    }

    pub async fn my_revenue(&self, params: RevenueParams) -> QueryState<RevenueStats> {
        let key = coaches::my_revenue(&params);
        let api = Arc::clone(&self.api);
        read_query(&self.client, key, move || {
            let api = Arc::clone(&api);
            let params = params.clone();
            async move { api.my_revenue(&params).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use gymdesk_api_types::RevenuePeriod;

    use super::*;
    use crate::application::resources::fake::FakeApi;
    use crate::cache::CacheConfig;

    #[tokio::test(start_paused = true)]
    async fn parameters_select_distinct_entries() {
        let client = QueryClient::new(CacheConfig::default());
        let resource = RevenueResource::new(client.clone(), Arc::new(FakeApi::default()));

        let overall = resource.my_revenue(RevenueParams::default()).await;
        let scoped = resource
            .my_revenue(RevenueParams {
                gym_id: Some("g1".to_string()),
                period: Some(RevenuePeriod::Month),
            })
            .await;

        assert_eq!(overall.data.unwrap().total_cents, 12_500);
        assert_eq!(scoped.data.unwrap().total_cents, 5_000);
        assert_eq!(client.len(), 2);
    }
}
