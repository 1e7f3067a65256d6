//! Per-key cache entry state machine.
//!
//! An entry records the outcome of its last completed fetch (`Idle`,
//! `Success` or `Error`) separately from whether a fetch is currently in
//! flight. The observable status is `Fetching` exactly while a request issued
//! under the entry's current generation is outstanding.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;

use super::error::{FetchFailure, QueryError};

pub(crate) type Data = Arc<dyn Any + Send + Sync>;
pub(crate) type SharedFetch = Shared<BoxFuture<'static, Result<Data, QueryError>>>;
pub(crate) type Fetcher =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Data, FetchFailure>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Idle,
    Fetching,
    Success,
    Error,
}

pub(crate) struct InFlight {
    pub(crate) generation: u64,
    pub(crate) future: SharedFetch,
}

pub(crate) struct CacheEntry {
    pub(crate) data: Option<Data>,
    pub(crate) data_updated_at: Option<Instant>,
    pub(crate) error: Option<QueryError>,
    settled: QueryStatus,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) invalidated: bool,
    pub(crate) generation: u64,
    pub(crate) observers: usize,
    pub(crate) last_access: Instant,
    pub(crate) fetcher: Option<Fetcher>,
    notify: watch::Sender<u64>,
}

impl CacheEntry {
    pub(crate) fn new(now: Instant) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            data: None,
            data_updated_at: None,
            error: None,
            settled: QueryStatus::Idle,
            in_flight: None,
            invalidated: false,
            generation: 0,
            observers: 0,
            last_access: now,
            fetcher: None,
            notify,
        }
    }

    pub(crate) fn status(&self) -> QueryStatus {
        if self.in_flight.is_some() {
            QueryStatus::Fetching
        } else {
            self.settled
        }
    }

    pub(crate) fn is_stale(&self, now: Instant, stale_time: Duration) -> bool {
        if self.invalidated {
            return true;
        }
        match self.data_updated_at {
            Some(updated) => now.saturating_duration_since(updated) >= stale_time,
            None => true,
        }
    }

    /// Fresh enough to be served, possibly stale-while-revalidate.
    pub(crate) fn servable(&self) -> Option<Data> {
        if self.invalidated {
            return None;
        }
        self.data.clone()
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_access = now;
    }

    pub(crate) fn begin(&mut self, future: SharedFetch) {
        self.in_flight = Some(InFlight {
            generation: self.generation,
            future,
        });
        self.bump();
    }

    /// Record a completed fetch. Returns `false` when the result belongs to a
    /// superseded generation and was discarded.
    pub(crate) fn settle(
        &mut self,
        generation: u64,
        result: &Result<Data, QueryError>,
        now: Instant,
    ) -> bool {
        if generation != self.generation {
            return false;
        }
        self.in_flight = None;
        match result {
            Ok(data) => {
                self.data = Some(Arc::clone(data));
                self.data_updated_at = Some(now);
                self.error = None;
                self.invalidated = false;
                self.settled = QueryStatus::Success;
            }
            Err(err) => {
                self.error = Some(err.clone());
                self.settled = QueryStatus::Error;
            }
        }
        self.bump();
        true
    }

    /// Mark stale and start a new generation; any outstanding request is
    /// detached and its result will be discarded.
    pub(crate) fn invalidate(&mut self) {
        self.invalidated = true;
        self.generation += 1;
        self.in_flight = None;
        self.bump();
    }

    pub(crate) fn set_data(&mut self, data: Data, now: Instant) {
        self.generation += 1;
        self.in_flight = None;
        self.data = Some(data);
        self.data_updated_at = Some(now);
        self.error = None;
        self.invalidated = false;
        self.settled = QueryStatus::Success;
        self.bump();
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    pub(crate) fn is_evictable(&self, now: Instant, gc_time: Duration) -> bool {
        self.observers == 0
            && self.in_flight.is_none()
            && now.saturating_duration_since(self.last_access) >= gc_time
    }

    fn bump(&mut self) {
        self.notify.send_modify(|version| *version = version.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;

    fn pending_future() -> SharedFetch {
        futures::future::pending::<Result<Data, QueryError>>()
            .boxed()
            .shared()
    }

    #[tokio::test]
    async fn status_follows_last_completed_operation() {
        let now = Instant::now();
        let mut entry = CacheEntry::new(now);
        assert_eq!(entry.status(), QueryStatus::Idle);

        entry.begin(pending_future());
        assert_eq!(entry.status(), QueryStatus::Fetching);

        let data: Data = Arc::new(5u32);
        assert!(entry.settle(0, &Ok(data), now));
        assert_eq!(entry.status(), QueryStatus::Success);

        entry.begin(pending_future());
        let err = QueryError::Aborted { key: "k".into() };
        assert!(entry.settle(0, &Err(err), now));
        assert_eq!(entry.status(), QueryStatus::Error);
        assert!(entry.data.is_some(), "error keeps previous data");
    }

    #[tokio::test]
    async fn superseded_result_is_discarded() {
        let now = Instant::now();
        let mut entry = CacheEntry::new(now);
        entry.begin(pending_future());
        entry.invalidate();

        let data: Data = Arc::new("old");
        assert!(!entry.settle(0, &Ok(data), now));
        assert!(entry.data.is_none());
        assert!(entry.invalidated);
        assert_eq!(entry.status(), QueryStatus::Idle);
    }

    #[tokio::test]
    async fn staleness_uses_threshold_and_invalidation() {
        let now = Instant::now();
        let mut entry = CacheEntry::new(now);
        assert!(entry.is_stale(now, Duration::from_secs(60)));

        entry.set_data(Arc::new(1u8), now);
        assert!(!entry.is_stale(now, Duration::from_secs(60)));
        assert!(entry.is_stale(now + Duration::from_secs(60), Duration::from_secs(60)));

        entry.invalidate();
        assert!(entry.is_stale(now, Duration::from_secs(60)));
        assert!(entry.servable().is_none());
    }

    #[tokio::test]
    async fn notifications_bump_version() {
        let mut entry = CacheEntry::new(Instant::now());
        let rx = entry.subscribe();
        let before = *rx.borrow();
        entry.invalidate();
        assert_ne!(*rx.borrow(), before);
    }
}
