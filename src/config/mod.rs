//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{fmt, net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{CliArgs, Command, DeploymentArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "gymdesk";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_API_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SESSION_COOKIE: &str = "next-auth.session-token";
const MIN_AUTH_SECRET_CHARS: usize = 32;
const DEFAULT_CACHE_STALE_SECS: u64 = 5 * 60;
const DEFAULT_CACHE_GC_SECS: u64 = 30 * 60;
const DEFAULT_CACHE_QUERY_ATTEMPTS: u32 = 3;
const DEFAULT_CACHE_MUTATION_ATTEMPTS: u32 = 1;
const DEFAULT_CACHE_BACKOFF_BASE_MS: u64 = 1_000;
const DEFAULT_CACHE_BACKOFF_CAP_MS: u64 = 30_000;
const DEFAULT_CACHE_SWEEP_SECS: u64 = 60;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: DeploymentEnv,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub api: ApiSettings,
    pub auth: AuthSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentEnv {
    Development,
    Production,
}

impl DeploymentEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentEnv::Development => "development",
            DeploymentEnv::Production => "production",
        }
    }
}

impl FromStr for DeploymentEnv {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(DeploymentEnv::Development),
            "production" | "prod" => Ok(DeploymentEnv::Production),
            other => Err(format!(
                "unknown environment `{other}` (expected development or production)"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: Url,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub url: Url,
    pub secret: Secret,
    pub session_cookie: String,
}

/// String whose value never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub stale_time: Duration,
    pub gc_time: Duration,
    pub query_attempts: NonZeroU32,
    pub mutation_attempts: NonZeroU32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub refetch_on_focus: bool,
    pub sweep_interval: Duration,
}

/// One rejected configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidField {
    pub key: &'static str,
    pub reason: String,
}

impl fmt::Display for InvalidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`: {}", self.key, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration: {}", join_fields(.0))]
    Invalid(Vec<InvalidField>),
}

impl LoadError {
    /// Rejected keys, in the order they were checked.
    pub fn invalid_keys(&self) -> Vec<&'static str> {
        match self {
            LoadError::Invalid(fields) => fields.iter().map(|field| field.key).collect(),
            LoadError::Build(_) => Vec::new(),
        }
    }
}

fn join_fields(fields: &[InvalidField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Accumulates every invalid field so startup reports them all at once.
#[derive(Debug, Default)]
struct Issues(Vec<InvalidField>);

impl Issues {
    fn push(&mut self, key: &'static str, reason: impl Into<String>) {
        self.0.push(InvalidField {
            key,
            reason: reason.into(),
        });
    }

    fn check<T>(&mut self, key: &'static str, result: Result<T, String>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(reason) => {
                self.push(key, reason);
                None
            }
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("GYMDESK").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_deployment_args(&cli.deployment);
    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::CheckConfig) | None => {}
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    environment: Option<String>,
    server: RawServerSettings,
    logging: RawLoggingSettings,
    api: RawApiSettings,
    auth: RawAuthSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_deployment_args(&mut self, args: &DeploymentArgs) {
        if let Some(url) = args.api_url.as_ref() {
            self.api.base_url = Some(url.clone());
        }
        if let Some(url) = args.auth_url.as_ref() {
            self.auth.url = Some(url.clone());
        }
        if let Some(secret) = args.auth_secret.as_ref() {
            self.auth.secret = Some(secret.clone());
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(environment) = overrides.environment.as_ref() {
            self.environment = Some(environment.clone());
        }
        if let Some(seconds) = overrides.cache_stale_seconds {
            self.cache.stale_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_gc_seconds {
            self.cache.gc_seconds = Some(seconds);
        }
        if let Some(attempts) = overrides.cache_query_attempts {
            self.cache.query_attempts = Some(attempts);
        }
        if let Some(attempts) = overrides.cache_mutation_attempts {
            self.cache.mutation_attempts = Some(attempts);
        }
        if let Some(enabled) = overrides.cache_refetch_on_focus {
            self.cache.refetch_on_focus = Some(enabled);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            environment,
            server,
            logging,
            api,
            auth,
            cache,
        } = raw;

        let mut issues = Issues::default();

        let environment = issues.check(
            "environment",
            environment
                .as_deref()
                .map_or(Ok(DeploymentEnv::Development), DeploymentEnv::from_str),
        );
        let server = build_server_settings(server, &mut issues);
        let logging = build_logging_settings(logging, &mut issues);
        let api = build_api_settings(api, &mut issues);
        let auth = build_auth_settings(auth, &mut issues);
        let cache = build_cache_settings(
            cache,
            environment.unwrap_or(DeploymentEnv::Development),
            &mut issues,
        );

        match (environment, server, logging, api, auth, cache) {
            (Some(environment), Some(server), Some(logging), Some(api), Some(auth), Some(cache))
                if issues.0.is_empty() =>
            {
                Ok(Self {
                    environment,
                    server,
                    logging,
                    api,
                    auth,
                    cache,
                })
            }
            _ => Err(LoadError::Invalid(issues.0)),
        }
    }
}

fn build_server_settings(server: RawServerSettings, issues: &mut Issues) -> Option<ServerSettings> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        issues.push("server.port", "port must be greater than zero");
        return None;
    }
    let addr = issues.check("server.addr", parse_socket_addr(&host, port));

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    let graceful_shutdown = issues.check(
        "server.graceful_shutdown_seconds",
        positive_secs(graceful_secs),
    );

    Some(ServerSettings {
        addr: addr?,
        graceful_shutdown: graceful_shutdown?,
    })
}

fn build_logging_settings(
    logging: RawLoggingSettings,
    issues: &mut Issues,
) -> Option<LoggingSettings> {
    let level = match logging.level {
        Some(level) => issues.check(
            "logging.level",
            LevelFilter::from_str(level.as_str()).map_err(|err| format!("failed to parse: {err}")),
        )?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Some(LoggingSettings { level, format })
}

fn build_api_settings(api: RawApiSettings, issues: &mut Issues) -> Option<ApiSettings> {
    let base_url = issues.check("api.base_url", required_url(api.base_url.as_deref()));
    let timeout = issues.check(
        "api.request_timeout_seconds",
        positive_secs(
            api.request_timeout_seconds
                .unwrap_or(DEFAULT_API_TIMEOUT_SECS),
        ),
    );

    Some(ApiSettings {
        base_url: base_url?,
        request_timeout: timeout?,
    })
}

fn build_auth_settings(auth: RawAuthSettings, issues: &mut Issues) -> Option<AuthSettings> {
    let url = issues.check("auth.url", required_url(auth.url.as_deref()));

    let secret = match auth.secret.as_deref().map(str::trim) {
        None | Some("") => {
            issues.push("auth.secret", "is required");
            None
        }
        Some(secret) if secret.chars().count() < MIN_AUTH_SECRET_CHARS => {
            issues.push(
                "auth.secret",
                format!("must be at least {MIN_AUTH_SECRET_CHARS} characters"),
            );
            None
        }
        Some(secret) => Some(Secret::from(secret.to_string())),
    };

    let session_cookie = auth
        .session_cookie
        .map(|name| name.trim().to_string())
        .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());
    if session_cookie.is_empty() {
        issues.push("auth.session_cookie", "must not be empty");
        return None;
    }

    Some(AuthSettings {
        url: url?,
        secret: secret?,
        session_cookie,
    })
}

fn build_cache_settings(
    cache: RawCacheSettings,
    environment: DeploymentEnv,
    issues: &mut Issues,
) -> Option<CacheSettings> {
    let stale_time = Duration::from_secs(cache.stale_seconds.unwrap_or(DEFAULT_CACHE_STALE_SECS));
    let gc_time = Duration::from_secs(cache.gc_seconds.unwrap_or(DEFAULT_CACHE_GC_SECS));

    let query_attempts = issues.check(
        "cache.query_attempts",
        non_zero_u32(
            cache
                .query_attempts
                .unwrap_or(DEFAULT_CACHE_QUERY_ATTEMPTS),
        ),
    );
    let mutation_attempts = issues.check(
        "cache.mutation_attempts",
        non_zero_u32(
            cache
                .mutation_attempts
                .unwrap_or(DEFAULT_CACHE_MUTATION_ATTEMPTS),
        ),
    );

    let backoff_base = Duration::from_millis(
        cache
            .backoff_base_ms
            .unwrap_or(DEFAULT_CACHE_BACKOFF_BASE_MS),
    );
    let backoff_cap = Duration::from_millis(
        cache
            .backoff_cap_ms
            .unwrap_or(DEFAULT_CACHE_BACKOFF_CAP_MS),
    );
    if backoff_cap < backoff_base {
        issues.push(
            "cache.backoff_cap_ms",
            "must not be smaller than cache.backoff_base_ms",
        );
    }

    let sweep_interval = issues.check(
        "cache.sweep_interval_seconds",
        positive_secs(
            cache
                .sweep_interval_seconds
                .unwrap_or(DEFAULT_CACHE_SWEEP_SECS),
        ),
    );

    let refetch_on_focus = cache
        .refetch_on_focus
        .unwrap_or(environment == DeploymentEnv::Production);

    Some(CacheSettings {
        stale_time,
        gc_time,
        query_attempts: query_attempts?,
        mutation_attempts: mutation_attempts?,
        backoff_base,
        backoff_cap,
        refetch_on_focus,
        sweep_interval: sweep_interval?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiSettings {
    base_url: Option<String>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    url: Option<String>,
    secret: Option<String>,
    session_cookie: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    stale_seconds: Option<u64>,
    gc_seconds: Option<u64>,
    query_attempts: Option<u32>,
    mutation_attempts: Option<u32>,
    backoff_base_ms: Option<u64>,
    backoff_cap_ms: Option<u64>,
    refetch_on_focus: Option<bool>,
    sweep_interval_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn required_url(value: Option<&str>) -> Result<Url, String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty());
    let Some(value) = value else {
        return Err("is required".to_string());
    };
    let url = Url::parse(value).map_err(|err| format!("invalid URL `{value}`: {err}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("URL `{value}` must use http or https"));
    }
    Ok(url)
}

fn positive_secs(seconds: u64) -> Result<Duration, String> {
    if seconds == 0 {
        return Err("must be greater than zero".to_string());
    }
    Ok(Duration::from_secs(seconds))
}

fn non_zero_u32(value: u32) -> Result<NonZeroU32, String> {
    NonZeroU32::new(value).ok_or_else(|| "must be greater than zero".to_string())
}
