//! reqwest adapter for the remote gym-management API.

use std::sync::Arc;

use async_trait::async_trait;
use gymdesk_api_types::{
    AvailabilitySlot, CoachProfile, CoachProfileUpdate, ErrorBody, Gym, GymInput, GymListParams,
    GymPage, RevenueParams, RevenueStats, SetAvailabilityRequest,
};
use reqwest::{Client, Method, Response, Url, header};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::application::api::{ApiError, GymApi, GymApiConnector};
use crate::application::session::SessionToken;
use crate::config::ApiSettings;

use super::error::InfraError;

/// Shared HTTP client; [`GymApiConnector::connect`] binds it to a session.
#[derive(Clone, Debug)]
pub struct HttpApiClient {
    client: Client,
    base: Url,
}

impl HttpApiClient {
    pub fn new(settings: &ApiSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| InfraError::configuration(format!("failed to build API client: {err}")))?;
        Ok(Self {
            client,
            base: settings.base_url.clone(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("gymdesk/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }
}

impl GymApiConnector for HttpApiClient {
    fn connect(&self, token: &SessionToken) -> Arc<dyn GymApi> {
        Arc::new(SessionApi {
            http: self.clone(),
            token: token.clone(),
        })
    }
}

/// API client acting with one session's bearer token.
pub struct SessionApi {
    http: HttpApiClient,
    token: SessionToken,
}

impl SessionApi {
    /// Append `path` segments to the base URL, percent-encoding each one.
    fn url(&self, path: &[&str], query: &[(&str, String)]) -> Result<Url, ApiError> {
        let mut url = self.http.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Url(format!("`{}` cannot be a base", self.http.base)))?
            .pop_if_empty()
            .extend(path);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &[&str],
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path, query)?;
        debug!(target = "gymdesk::api", %method, %url, "remote API request");

        let mut request = self
            .http
            .client
            .request(method, url)
            .bearer_auth(self.token.expose())
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        ensure_success(response).await
    }

    async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &[&str],
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let response = self.send(method, path, query, body).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ApiError::Transport(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| ApiError::Decode(err.to_string()))
    }

    async fn request_unit(
        &self,
        method: Method,
        path: &[&str],
        query: &[(&str, String)],
    ) -> Result<(), ApiError> {
        self.send::<()>(method, path, query, None).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            }
        });
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

fn gym_filter(gym_id: Option<&str>) -> Vec<(&'static str, String)> {
    gym_id
        .map(|id| vec![("gymId", id.to_string())])
        .unwrap_or_default()
}

const AVAILABILITY: &[&str] = &["coaches", "me", "availability"];
const REVENUE: &[&str] = &["coaches", "me", "revenue"];
const PROFILE: &[&str] = &["coaches", "me", "profile"];
const GYMS: &[&str] = &["gyms"];

#[async_trait]
impl GymApi for SessionApi {
    async fn my_availability(
        &self,
        gym_id: Option<&str>,
    ) -> Result<Vec<AvailabilitySlot>, ApiError> {
        self.request::<_, ()>(
            Method::GET,
            AVAILABILITY,
            &gym_filter(gym_id),
            None,
        )
        .await
    }

    async fn set_availability(
        &self,
        request: &SetAvailabilityRequest,
    ) -> Result<AvailabilitySlot, ApiError> {
        self.request(Method::POST, AVAILABILITY, &[], Some(request))
            .await
    }

    async fn delete_availability(&self, gym_id: Option<&str>) -> Result<(), ApiError> {
        self.request_unit(
            Method::DELETE,
            AVAILABILITY,
            &gym_filter(gym_id),
        )
        .await
    }

    async fn my_revenue(&self, params: &RevenueParams) -> Result<RevenueStats, ApiError> {
        let mut query = gym_filter(params.gym_id.as_deref());
        if let Some(period) = params.period {
            query.push(("period", period.as_str().to_string()));
        }
        self.request::<_, ()>(Method::GET, REVENUE, &query, None)
            .await
    }

    async fn list_gyms(&self, params: &GymListParams) -> Result<GymPage, ApiError> {
        let mut query = Vec::new();
        if let Some(search) = params.search.as_ref() {
            query.push(("search", search.clone()));
        }
        if let Some(city) = params.city.as_ref() {
            query.push(("city", city.clone()));
        }
        if let Some(active) = params.active {
            query.push(("active", active.to_string()));
        }
        if let Some(page) = params.page {
            query.push(("page", page.to_string()));
        }
        self.request::<_, ()>(Method::GET, GYMS, &query, None).await
    }

    async fn gym(&self, id: &str) -> Result<Gym, ApiError> {
        self.request::<_, ()>(Method::GET, &["gyms", id], &[], None)
            .await
    }

    async fn create_gym(&self, input: &GymInput) -> Result<Gym, ApiError> {
        self.request(Method::POST, GYMS, &[], Some(input)).await
    }

    async fn update_gym(&self, id: &str, input: &GymInput) -> Result<Gym, ApiError> {
        self.request(Method::PUT, &["gyms", id], &[], Some(input))
            .await
    }

    async fn delete_gym(&self, id: &str) -> Result<(), ApiError> {
        self.request_unit(Method::DELETE, &["gyms", id], &[]).await
    }

    async fn my_coach_profile(&self) -> Result<CoachProfile, ApiError> {
        self.request::<_, ()>(Method::GET, PROFILE, &[], None)
            .await
    }

    async fn update_coach_profile(
        &self,
        update: &CoachProfileUpdate,
    ) -> Result<CoachProfile, ApiError> {
        self.request(Method::PUT, PROFILE, &[], Some(update))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gymdesk_api_types::DayOfWeek;
    use httpmock::MockServer;

    use super::*;

    fn api(server: &MockServer) -> Arc<dyn GymApi> {
        let settings = ApiSettings {
            base_url: Url::parse(&server.url("/api/")).unwrap(),
            request_timeout: Duration::from_secs(5),
        };
        let client = HttpApiClient::new(&settings).unwrap();
        client.connect(&SessionToken::new("tok-123").unwrap())
    }

    const SLOT_JSON: &str = r#"{"id":"s1","gym_id":"g1","day_of_week":"monday","start_time":"09:00","end_time":"10:00"}"#;

    #[tokio::test]
    async fn availability_read_sends_bearer_and_filter() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET")
                .path("/api/coaches/me/availability")
                .query_param("gymId", "g1")
                .header("authorization", "Bearer tok-123");
            then.status(200)
                .header("content-type", "application/json")
                .body(format!("[{SLOT_JSON}]"));
        });

        let slots = api(&server).my_availability(Some("g1")).await.unwrap();
        mock.assert();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].day_of_week, DayOfWeek::Monday);
    }

    #[tokio::test]
    async fn set_availability_posts_json_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST")
                .path("/api/coaches/me/availability")
                .json_body_includes(
                    r#"{"gym_id":"g1","day_of_week":"monday","start_time":"09:00","end_time":"10:00"}"#,
                );
            then.status(201)
                .header("content-type", "application/json")
                .body(SLOT_JSON);
        });

        let slot = api(&server)
            .set_availability(&SetAvailabilityRequest {
                gym_id: "g1".to_string(),
                day_of_week: DayOfWeek::Monday,
                start_time: "09:00".to_string(),
                end_time: "10:00".to_string(),
            })
            .await
            .unwrap();
        mock.assert();
        assert_eq!(slot.id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn revenue_params_become_query_string() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET")
                .path("/api/coaches/me/revenue")
                .query_param("gymId", "g2")
                .query_param("period", "month");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"total_cents":4200,"currency":"EUR","sessions":3}"#);
        });

        let stats = api(&server)
            .my_revenue(&RevenueParams {
                gym_id: Some("g2".to_string()),
                period: Some(gymdesk_api_types::RevenuePeriod::Month),
            })
            .await
            .unwrap();
        mock.assert();
        assert_eq!(stats.total_cents, 4200);
        assert!(stats.by_gym.is_empty());
    }

    #[tokio::test]
    async fn error_body_message_is_surfaced() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/api/gyms/missing");
            then.status(404)
                .header("content-type", "application/json")
                .body(r#"{"message":"Gym not found","code":"NOT_FOUND"}"#);
        });

        let err = api(&server).gym("missing").await.unwrap_err();
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Gym not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_a_decode_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/api/coaches/me/profile");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"unexpected":true}"#);
        });

        let err = api(&server).my_coach_profile().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn delete_gym_accepts_empty_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("DELETE").path("/api/gyms/g1");
            then.status(204);
        });

        api(&server).delete_gym("g1").await.unwrap();
        mock.assert();
    }

    #[test]
    fn base_without_trailing_slash_keeps_its_path() {
        let settings = ApiSettings {
            base_url: Url::parse("https://api.example.com/v1").unwrap(),
            request_timeout: Duration::from_secs(5),
        };
        let client = HttpApiClient::new(&settings).unwrap();
        let api = SessionApi {
            http: client,
            token: SessionToken::new("t").unwrap(),
        };
        let url = api.url(&["gyms", "a b"], &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/gyms/a%20b");
    }
}
