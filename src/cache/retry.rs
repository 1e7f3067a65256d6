use std::future::Future;

use metrics::{counter, histogram};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use super::config::RetryPolicy;
use super::error::{FetchFailure, QueryError};

const METRIC_ATTEMPT_TOTAL: &str = "gymdesk_query_fetch_total";
const METRIC_RETRY_TOTAL: &str = "gymdesk_query_retry_total";
const METRIC_FETCH_MS: &str = "gymdesk_query_fetch_ms";

/// Run `operation` until it succeeds or the policy's attempts are exhausted.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    kind: &'static str,
    label: &str,
    mut operation: F,
) -> Result<T, QueryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchFailure>>,
{
    let started_at = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        counter!(METRIC_ATTEMPT_TOTAL, "kind" => kind).increment(1);

        match operation().await {
            Ok(value) => {
                let elapsed_ms = started_at.elapsed().as_secs_f64() * 1000.0;
                histogram!(METRIC_FETCH_MS, "kind" => kind).record(elapsed_ms);
                debug!(
                    target = "gymdesk::cache::retry",
                    kind,
                    key = label,
                    attempt,
                    elapsed_ms,
                    "remote call succeeded"
                );
                return Ok(value);
            }
            Err(cause) if attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt - 1);
                counter!(METRIC_RETRY_TOTAL, "kind" => kind).increment(1);
                warn!(
                    target = "gymdesk::cache::retry",
                    kind,
                    key = label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %cause,
                    "remote call failed, retrying"
                );
                sleep(delay).await;
            }
            Err(cause) => {
                warn!(
                    target = "gymdesk::cache::retry",
                    kind,
                    key = label,
                    attempts = attempt,
                    error = %cause,
                    "remote call failed, retries exhausted"
                );
                return Err(QueryError::Failed {
                    attempts: attempt,
                    message: cause.to_string(),
                    cause,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            attempts,
            Duration::from_millis(1_000),
            Duration::from_millis(30_000),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = with_retry(&policy(3), "query", "k", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Arc::new(Boom) as FetchFailure) }
        })
        .await;

        assert!(matches!(result, Err(QueryError::Failed { attempts: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second.
        assert_eq!(started.elapsed(), Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_later_attempt() {
        let calls = AtomicU32::new(0);

        let result = with_retry(&policy(3), "query", "k", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Arc::new(Boom) as FetchFailure)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.expect("second attempt succeeds"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_never_sleeps() {
        let started = Instant::now();
        let result: Result<(), _> = with_retry(&policy(1), "mutation", "k", || async {
            Err(Arc::new(Boom) as FetchFailure)
        })
        .await;

        assert!(matches!(result, Err(QueryError::Failed { attempts: 1, .. })));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
