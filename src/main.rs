use std::{process, sync::Arc};

use gymdesk::{
    application::{
        error::AppError,
        guard::RouteGuard,
        session::SessionResolver,
    },
    cache::{CacheConfig, SessionCaches},
    config,
    domain::access::PermissionTable,
    infra::{
        api_client::HttpApiClient,
        auth::NextAuthProvider,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let invalid = error.invalid_keys();
    if dispatcher::has_been_set() {
        error!(error = %error, invalid_keys = ?invalid, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, invalid_keys = ?invalid, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::CheckConfig => {
            info!(
                target = "gymdesk::config",
                environment = settings.environment.as_str(),
                api = %settings.api.base_url,
                auth = %settings.auth.url,
                "configuration is valid"
            );
            Ok(())
        }
    }
}

fn build_http_state(settings: &config::Settings) -> Result<HttpState, AppError> {
    let api = HttpApiClient::new(&settings.api)?;
    let auth_client = reqwest::Client::builder()
        .user_agent(HttpApiClient::user_agent())
        .timeout(settings.api.request_timeout)
        .build()
        .map_err(|err| InfraError::configuration(format!("failed to build auth client: {err}")))?;
    let provider = NextAuthProvider::new(&settings.auth, auth_client)?;

    let guard = RouteGuard::new(
        SessionResolver::new(Arc::new(provider)),
        PermissionTable::default(),
    );
    let caches = SessionCaches::new(CacheConfig::from(&settings.cache));

    Ok(HttpState {
        guard,
        caches,
        connector: Arc::new(api),
        session_cookie: settings.auth.session_cookie.clone(),
        auth_url: settings.auth.url.clone(),
        environment: settings.environment,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = build_http_state(&settings)?;
    let sweeper = state.caches.spawn_sweeper();
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "gymdesk::server",
        addr = %settings.server.addr,
        environment = settings.environment.as_str(),
        "listening"
    );

    let shutdown = Arc::new(Notify::new());
    let mut server = {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async move {
                    shutdown_signal().await;
                    shutdown.notify_one();
                })
                .await
        })
    };

    let grace = settings.server.graceful_shutdown;
    let result = tokio::select! {
        joined = &mut server => joined,
        () = async {
            shutdown.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "gymdesk::server",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; aborting open connections"
            );
            server.abort();
            Ok(Ok(()))
        }
    };

    sweeper.abort();
    let _ = sweeper.await;

    match result {
        Ok(Ok(())) => {
            info!(target = "gymdesk::server", "server stopped");
            Ok(())
        }
        Ok(Err(err)) => Err(AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target = "gymdesk::server",
            error = %err,
            "failed to listen for shutdown signal"
        );
        std::future::pending::<()>().await;
    }
    info!(target = "gymdesk::server", "shutdown signal received");
}
