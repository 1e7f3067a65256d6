use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the gymdesk binary.
#[derive(Debug, Parser)]
#[command(name = "gymdesk", version, about = "Gym management admin panel")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "GYMDESK_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub deployment: DeploymentArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the admin panel HTTP server.
    Serve(Box<ServeArgs>),
    /// Validate configuration and exit.
    #[command(name = "check-config")]
    CheckConfig,
}

/// Deployment variables shared with the hosted front end.
#[derive(Debug, Args, Default, Clone)]
pub struct DeploymentArgs {
    /// Base URL of the remote gym-management API.
    #[arg(long = "api-url", env = "NEXT_PUBLIC_API_URL", value_name = "URL")]
    pub api_url: Option<String>,

    /// Base URL of the auth provider.
    #[arg(long = "auth-url", env = "NEXTAUTH_URL", value_name = "URL")]
    pub auth_url: Option<String>,

    /// Secret shared with the auth provider (at least 32 characters).
    #[arg(
        long = "auth-secret",
        env = "NEXTAUTH_SECRET",
        value_name = "SECRET",
        hide_env_values = true
    )]
    pub auth_secret: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Deployment environment (development|production).
    #[arg(long = "environment", value_name = "ENV")]
    pub environment: Option<String>,

    /// Override how long cached data stays fresh.
    #[arg(long = "cache-stale-seconds", value_name = "SECONDS")]
    pub cache_stale_seconds: Option<u64>,

    /// Override how long unobserved cache entries are retained.
    #[arg(long = "cache-gc-seconds", value_name = "SECONDS")]
    pub cache_gc_seconds: Option<u64>,

    /// Override total attempts for reads.
    #[arg(long = "cache-query-attempts", value_name = "COUNT")]
    pub cache_query_attempts: Option<u32>,

    /// Override total attempts for writes.
    #[arg(long = "cache-mutation-attempts", value_name = "COUNT")]
    pub cache_mutation_attempts: Option<u32>,

    /// Toggle refetching stale data when a client regains focus.
    #[arg(
        long = "cache-refetch-on-focus",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_refetch_on_focus: Option<bool>,
}
