use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Dependencies whose request-level chatter is capped at `warn` unless
/// `RUST_LOG` names them explicitly.
const QUIET_TARGETS: [&str; 3] = ["hyper_util=warn", "reqwest=warn", "rustls=warn"];

/// Install the global subscriber for the gymdesk server and describe its
/// cache metrics.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let mut filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();
    for directive in QUIET_TARGETS {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default())
        .with(output_layer(logging.format))
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber already set: {err}")))?;

    tracing::debug!(
        target = "gymdesk::telemetry",
        level = %logging.level,
        json = matches!(logging.format, LogFormat::Json),
        "telemetry initialised"
    );
    Ok(())
}

fn output_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> LookupSpan<'span> + 'static,
{
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    }
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "gymdesk_query_fetch_total",
            Unit::Count,
            "Total number of remote fetch and mutation attempts."
        );
        describe_counter!(
            "gymdesk_query_retry_total",
            Unit::Count,
            "Total number of attempts retried after a failure."
        );
        describe_counter!(
            "gymdesk_query_dedup_total",
            Unit::Count,
            "Total number of reads served by an already outstanding fetch."
        );
        describe_counter!(
            "gymdesk_query_invalidated_total",
            Unit::Count,
            "Total number of cache entries marked stale by invalidation."
        );
        describe_counter!(
            "gymdesk_query_evicted_total",
            Unit::Count,
            "Total number of unobserved cache entries evicted after retention."
        );
        describe_gauge!(
            "gymdesk_session_caches",
            Unit::Count,
            "Current number of live per-session query caches."
        );
        describe_histogram!(
            "gymdesk_query_fetch_ms",
            Unit::Milliseconds,
            "Remote call latency in milliseconds, including retries."
        );
    });
}
