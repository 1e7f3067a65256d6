//! Resource hooks binding remote API calls to the session's query cache.
//!
//! Reads return a [`QueryState`] whose status is `Error` when the fetch failed
//! after retries; they never return the failure as an `Err`. Writes validate
//! their input first, run through [`QueryClient::mutate`] and invalidate the
//! narrowest key prefix covering every read they can affect.

mod availability;
mod coach_profile;
mod gyms;
mod revenue;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

pub use availability::AvailabilityResource;
pub use coach_profile::CoachProfileResource;
pub use gyms::GymResource;
pub use revenue::RevenueResource;

use super::api::{ApiError, GymApi};
use crate::cache::{QueryClient, QueryError, QueryKey, QueryState, QueryStatus};
use crate::domain::validation::FieldErrors;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("invalid input: {0}")]
    Validation(#[from] FieldErrors),
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl ResourceError {
    /// Remote API failure behind a query error, if any.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ResourceError::Query(err) => err.cause_as::<ApiError>(),
            ResourceError::Validation(_) => None,
        }
    }
}

/// Every hook for one session, sharing its cache and API client.
#[derive(Clone)]
pub struct Resources {
    pub availability: AvailabilityResource,
    pub revenue: RevenueResource,
    pub gyms: GymResource,
    pub coach_profile: CoachProfileResource,
}

impl Resources {
    pub fn new(client: QueryClient, api: Arc<dyn GymApi>) -> Self {
        Self {
            availability: AvailabilityResource::new(client.clone(), Arc::clone(&api)),
            revenue: RevenueResource::new(client.clone(), Arc::clone(&api)),
            gyms: GymResource::new(client.clone(), Arc::clone(&api)),
            coach_profile: CoachProfileResource::new(client, api),
        }
    }
}

async fn read_query<T, F, Fut>(client: &QueryClient, key: QueryKey, fetch: F) -> QueryState<T>
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    let outcome = client.fetch_query(&key, fetch).await;
    let mut state = client.get_query_state::<T>(&key);
    match outcome {
        Ok(data) => state.data = Some(data),
        Err(err) => {
            state.status = QueryStatus::Error;
            state.error = Some(err);
        }
    }
    state
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory `GymApi` used by resource and HTTP tests.

    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use gymdesk_api_types::{
        AvailabilitySlot, CoachProfile, CoachProfileUpdate, Gym, GymInput, GymListParams, GymPage,
        RevenueParams, RevenueStats, SetAvailabilityRequest,
    };

    use super::*;

    #[derive(Default)]
    pub struct FakeApi {
        pub slots: Mutex<Vec<AvailabilitySlot>>,
        pub gyms: Mutex<BTreeMap<String, Gym>>,
        pub profile: Mutex<Option<CoachProfile>>,
        pub availability_calls: AtomicUsize,
        pub gym_list_calls: AtomicUsize,
        pub fail_reads: AtomicUsize,
    }

    impl FakeApi {
        pub fn calls(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }

        fn maybe_fail(&self) -> Result<(), ApiError> {
            let remaining = self.fail_reads.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_reads.store(remaining - 1, Ordering::SeqCst);
                return Err(ApiError::Status {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl GymApi for FakeApi {
        async fn my_availability(
            &self,
            gym_id: Option<&str>,
        ) -> Result<Vec<AvailabilitySlot>, ApiError> {
            self.availability_calls.fetch_add(1, Ordering::SeqCst);
            self.maybe_fail()?;
            Ok(self
                .slots
                .lock()
                .unwrap()
                .iter()
                .filter(|slot| gym_id.is_none_or(|id| slot.gym_id == id))
                .cloned()
                .collect())
        }

        async fn set_availability(
            &self,
            request: &SetAvailabilityRequest,
        ) -> Result<AvailabilitySlot, ApiError> {
            let mut slots = self.slots.lock().unwrap();
            let slot = AvailabilitySlot {
                id: Some(format!("slot-{}", slots.len() + 1)),
                gym_id: request.gym_id.clone(),
                day_of_week: request.day_of_week,
                start_time: request.start_time.clone(),
                end_time: request.end_time.clone(),
            };
            slots.push(slot.clone());
            Ok(slot)
        }

        async fn delete_availability(&self, gym_id: Option<&str>) -> Result<(), ApiError> {
            self.slots
                .lock()
                .unwrap()
                .retain(|slot| gym_id.is_some_and(|id| slot.gym_id != id));
            Ok(())
        }

        async fn my_revenue(&self, params: &RevenueParams) -> Result<RevenueStats, ApiError> {
            self.maybe_fail()?;
            Ok(RevenueStats {
                total_cents: if params.gym_id.is_some() { 5_000 } else { 12_500 },
                currency: "USD".to_string(),
                sessions: 4,
                by_gym: Vec::new(),
            })
        }

        async fn list_gyms(&self, params: &GymListParams) -> Result<GymPage, ApiError> {
            self.gym_list_calls.fetch_add(1, Ordering::SeqCst);
            self.maybe_fail()?;
            let items: Vec<Gym> = self
                .gyms
                .lock()
                .unwrap()
                .values()
                .filter(|gym| params.active.is_none_or(|active| gym.is_active == active))
                .cloned()
                .collect();
            Ok(GymPage {
                total: items.len() as u64,
                items,
                page: params.page.unwrap_or(1),
            })
        }

        async fn gym(&self, id: &str) -> Result<Gym, ApiError> {
            self.gyms
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or(ApiError::Status {
                    status: 404,
                    message: "Gym not found".to_string(),
                })
        }

        async fn create_gym(&self, input: &GymInput) -> Result<Gym, ApiError> {
            let mut gyms = self.gyms.lock().unwrap();
            let gym = gym_from_input(format!("g{}", gyms.len() + 1), input);
            gyms.insert(gym.id.clone(), gym.clone());
            Ok(gym)
        }

        async fn update_gym(&self, id: &str, input: &GymInput) -> Result<Gym, ApiError> {
            let mut gyms = self.gyms.lock().unwrap();
            if !gyms.contains_key(id) {
                return Err(ApiError::Status {
                    status: 404,
                    message: "Gym not found".to_string(),
                });
            }
            let gym = gym_from_input(id.to_string(), input);
            gyms.insert(id.to_string(), gym.clone());
            Ok(gym)
        }

        async fn delete_gym(&self, id: &str) -> Result<(), ApiError> {
            self.gyms.lock().unwrap().remove(id);
            Ok(())
        }

        async fn my_coach_profile(&self) -> Result<CoachProfile, ApiError> {
            self.profile.lock().unwrap().clone().ok_or(ApiError::Status {
                status: 404,
                message: "Coach profile not found".to_string(),
            })
        }

        async fn update_coach_profile(
            &self,
            update: &CoachProfileUpdate,
        ) -> Result<CoachProfile, ApiError> {
            let mut profile = self.profile.lock().unwrap();
            let current = profile.get_or_insert_with(|| CoachProfile {
                id: "cp-1".to_string(),
                user_id: "u-1".to_string(),
                bio: None,
                specialties: Vec::new(),
                hourly_rate_cents: None,
                gym_ids: Vec::new(),
            });
            current.bio = update.bio.clone();
            current.specialties = update.specialties.clone();
            current.hourly_rate_cents = update.hourly_rate_cents;
            Ok(current.clone())
        }
    }

    fn gym_from_input(id: String, input: &GymInput) -> Gym {
        Gym {
            id,
            name: input.name.clone(),
            address: input.address.clone(),
            city: input.city.clone(),
            phone: input.phone.clone(),
            email: input.email.clone(),
            website: input.website.clone(),
            is_active: input.is_active,
        }
    }
}
