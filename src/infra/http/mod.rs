mod error;
mod middleware;
mod public;
mod session;
mod views;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use url::Url;

pub use error::{ErrorCode, ViewError};
pub use middleware::{GuardedView, RequestContext, SessionContext, extract_token};

use crate::application::api::GymApiConnector;
use crate::application::guard::RouteGuard;
use crate::cache::SessionCaches;
use crate::config::DeploymentEnv;
use crate::domain::access::View;

use middleware::{log_responses, require_view, set_request_context};

/// Shared state for every route.
#[derive(Clone)]
pub struct HttpState {
    pub guard: RouteGuard,
    pub caches: SessionCaches,
    pub connector: Arc<dyn GymApiConnector>,
    pub session_cookie: String,
    pub auth_url: Url,
    pub environment: DeploymentEnv,
}

impl HttpState {
    fn guarded(&self, view: View) -> GuardedView {
        GuardedView {
            state: self.clone(),
            view,
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    let guarded = |view: View, routes: Router<HttpState>| {
        routes.route_layer(axum_middleware::from_fn_with_state(
            state.guarded(view),
            require_view,
        ))
    };

    let dashboard = guarded(
        View::Dashboard,
        Router::new()
            .route("/dashboard", get(views::dashboard))
            .route("/session/focus", post(session::focus)),
    );
    let availability = guarded(
        View::CoachAvailability,
        Router::new().route(
            "/coach/availability",
            get(views::my_availability)
                .post(views::set_availability)
                .delete(views::delete_availability),
        ),
    );
    let revenue = guarded(
        View::CoachRevenue,
        Router::new().route("/coach/revenue", get(views::my_revenue)),
    );
    let profile = guarded(
        View::CoachProfile,
        Router::new().route(
            "/coach/profile",
            get(views::my_profile).put(views::update_profile),
        ),
    );
    let directory = guarded(
        View::GymDirectory,
        Router::new().route("/gyms", get(views::list_gyms)),
    );
    let gym_admin = guarded(
        View::GymAdmin,
        Router::new()
            .route("/admin/gyms", post(views::create_gym))
            .route(
                "/admin/gyms/{id}",
                get(views::gym_detail)
                    .put(views::update_gym)
                    .delete(views::delete_gym),
            ),
    );
    let platform = guarded(
        View::PlatformSettings,
        Router::new().route("/platform/settings", get(views::platform_settings)),
    );

    let open_routes = Router::new()
        .route("/health", get(public::health))
        .route("/login", get(public::login))
        .route("/access-denied", get(public::access_denied))
        .route("/logout", post(session::logout));

    open_routes
        .merge(dashboard)
        .merge(availability)
        .merge(revenue)
        .merge(profile)
        .merge(directory)
        .merge(gym_admin)
        .merge(platform)
        .fallback(public::not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
