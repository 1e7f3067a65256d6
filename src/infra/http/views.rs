//! Guarded JSON views. Each handler runs only after `require_view` has
//! rendered a `SessionContext` into the request.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use gymdesk_api_types::{
    CoachProfileUpdate, GymInput, GymListParams, RevenueParams, RevenuePeriod,
    SetAvailabilityRequest,
};
use serde::{Deserialize, Serialize};

use crate::cache::{QueryState, QueryStatus};
use crate::domain::access::View;

use super::HttpState;
use super::error::ViewError;
use super::middleware::SessionContext;

#[derive(Debug, Serialize)]
struct QueryView<'a, T> {
    status: QueryStatus,
    stale: bool,
    data: Option<&'a T>,
}

/// Render a hook result. An error state becomes an explicit error response.
fn query_response<T: Serialize>(state: QueryState<T>) -> Response {
    if let Some(err) = state.error.as_ref()
        && state.status == QueryStatus::Error
    {
        return ViewError::from_query(err).into_response();
    }
    Json(QueryView {
        status: state.status,
        stale: state.is_stale,
        data: state.data.as_deref(),
    })
    .into_response()
}

#[derive(Debug, Serialize)]
pub(super) struct DashboardView {
    identity: String,
    role: String,
    name: Option<String>,
    email: Option<String>,
    views: Vec<View>,
}

pub(super) async fn dashboard(
    State(state): State<HttpState>,
    Extension(ctx): Extension<SessionContext>,
) -> Json<DashboardView> {
    let session = ctx.session;
    Json(DashboardView {
        views: state.guard.permissions().views_for(session.role),
        role: session.role.to_string(),
        identity: session.identity,
        name: session.name,
        email: session.email,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct GymFilter {
    #[serde(rename = "gymId")]
    gym_id: Option<String>,
}

pub(super) async fn my_availability(
    Extension(ctx): Extension<SessionContext>,
    Query(filter): Query<GymFilter>,
) -> Response {
    let state = ctx
        .resources
        .availability
        .my_availability(filter.gym_id.as_deref())
        .await;
    query_response(state)
}

pub(super) async fn set_availability(
    Extension(ctx): Extension<SessionContext>,
    Json(request): Json<SetAvailabilityRequest>,
) -> Result<Response, ViewError> {
    let slot = ctx.resources.availability.set_availability(request).await?;
    Ok((StatusCode::CREATED, Json(slot)).into_response())
}

pub(super) async fn delete_availability(
    Extension(ctx): Extension<SessionContext>,
    Query(filter): Query<GymFilter>,
) -> Result<StatusCode, ViewError> {
    ctx.resources
        .availability
        .delete_availability(filter.gym_id.as_deref())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct RevenueQuery {
    #[serde(rename = "gymId")]
    gym_id: Option<String>,
    period: Option<RevenuePeriod>,
}

pub(super) async fn my_revenue(
    Extension(ctx): Extension<SessionContext>,
    Query(query): Query<RevenueQuery>,
) -> Response {
    let params = RevenueParams {
        gym_id: query.gym_id,
        period: query.period,
    };
    query_response(ctx.resources.revenue.my_revenue(params).await)
}

pub(super) async fn my_profile(Extension(ctx): Extension<SessionContext>) -> Response {
    query_response(ctx.resources.coach_profile.my_profile().await)
}

pub(super) async fn update_profile(
    Extension(ctx): Extension<SessionContext>,
    Json(update): Json<CoachProfileUpdate>,
) -> Result<Response, ViewError> {
    let profile = ctx.resources.coach_profile.update(update).await?;
    Ok(Json(profile).into_response())
}

pub(super) async fn list_gyms(
    Extension(ctx): Extension<SessionContext>,
    Query(params): Query<GymListParams>,
) -> Response {
    query_response(ctx.resources.gyms.list(params).await)
}

pub(super) async fn gym_detail(
    Extension(ctx): Extension<SessionContext>,
    Path(id): Path<String>,
) -> Response {
    query_response(ctx.resources.gyms.detail(&id).await)
}

pub(super) async fn create_gym(
    Extension(ctx): Extension<SessionContext>,
    Json(input): Json<GymInput>,
) -> Result<Response, ViewError> {
    let gym = ctx.resources.gyms.create(input).await?;
    Ok((StatusCode::CREATED, Json(gym)).into_response())
}

pub(super) async fn update_gym(
    Extension(ctx): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(input): Json<GymInput>,
) -> Result<Response, ViewError> {
    let gym = ctx.resources.gyms.update(&id, input).await?;
    Ok(Json(gym).into_response())
}

pub(super) async fn delete_gym(
    Extension(ctx): Extension<SessionContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, ViewError> {
    ctx.resources.gyms.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub(super) struct PlatformSettingsView {
    environment: &'static str,
    active_sessions: usize,
    cache: CacheSummary,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    stale_seconds: u64,
    gc_seconds: u64,
    query_attempts: u32,
    mutation_attempts: u32,
    refetch_on_focus: bool,
}

pub(super) async fn platform_settings(State(state): State<HttpState>) -> Json<PlatformSettingsView> {
    let config = state.caches.config();
    Json(PlatformSettingsView {
        environment: state.environment.as_str(),
        active_sessions: state.caches.len(),
        cache: CacheSummary {
            stale_seconds: config.stale_time.as_secs(),
            gc_seconds: config.gc_time.as_secs(),
            query_attempts: config.query_retry.max_attempts,
            mutation_attempts: config.mutation_retry.max_attempts,
            refetch_on_focus: config.refetch_on_window_focus,
        },
    })
}
