//! Query cache coordinator.
//!
//! `QueryClient` is the single owner of every cache entry for one session. All
//! writes go through its methods, which take the entry map lock for short,
//! synchronous critical sections and never hold it across an await point.
//! Fetches run as spawned tasks so that a request keeps populating the cache
//! even after the caller that triggered it has gone away.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, Weak};

use futures::FutureExt;
use metrics::counter;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::config::CacheConfig;
use super::entry::{CacheEntry, Data, Fetcher, QueryStatus, SharedFetch};
use super::error::{FetchFailure, QueryError};
use super::keys::QueryKey;
use super::lock::mutex_lock;
use super::mutation::{MutationRecord, MutationStatus};
use super::retry::with_retry;

const SOURCE: &str = "cache::client";
const METRIC_DEDUP_TOTAL: &str = "gymdesk_query_dedup_total";
const METRIC_INVALIDATED_TOTAL: &str = "gymdesk_query_invalidated_total";
const METRIC_EVICTED_TOTAL: &str = "gymdesk_query_evicted_total";

/// Read-only snapshot of one cache entry.
#[derive(Debug)]
pub struct QueryState<T> {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub data: Option<Arc<T>>,
    pub error: Option<QueryError>,
    pub updated_at: Option<Instant>,
    pub is_stale: bool,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            updated_at: self.updated_at,
            is_stale: self.is_stale,
        }
    }
}

impl<T> QueryState<T> {
    fn idle(key: QueryKey) -> Self {
        Self {
            key,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            is_stale: true,
        }
    }

    pub fn is_fetching(&self) -> bool {
        self.status == QueryStatus::Fetching
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }
}

struct Inner {
    config: CacheConfig,
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    mutations: Mutex<HashMap<Uuid, MutationRecord>>,
}

/// Handle to a session's query cache. Cheap to clone.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<Inner>,
}

impl QueryClient {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                entries: Mutex::new(HashMap::new()),
                mutations: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Return cached data for `key`, fetching it when absent or invalidated.
    ///
    /// Data older than the stale time is returned immediately while a
    /// background refetch runs. Concurrent callers for the same key share one
    /// outstanding request.
    pub async fn fetch_query<T, F, Fut, E>(
        &self,
        key: &QueryKey,
        fetch: F,
    ) -> Result<Arc<T>, QueryError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let pending = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "fetch_query");
            let now = Instant::now();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(now));
            entry.touch(now);
            let fetcher = erase(fetch);
            entry.fetcher = Some(Arc::clone(&fetcher));

            if let Some(data) = entry.servable() {
                if entry.is_stale(now, self.inner.config.stale_time) && entry.in_flight.is_none() {
                    debug!(key = %key, "serving stale data while revalidating");
                    let _ = self.start_fetch(key, entry, fetcher);
                }
                return downcast(key, data);
            }

            match entry.in_flight.as_ref() {
                Some(in_flight) => {
                    counter!(METRIC_DEDUP_TOTAL).increment(1);
                    in_flight.future.clone()
                }
                None => self.start_fetch(key, entry, fetcher),
            }
        };

        let data = pending.await?;
        downcast(key, data)
    }

    /// Register an observer for `key`. While at least one observer exists the
    /// entry is refetched on invalidation and focus, and is never evicted.
    pub fn subscribe<T, F, Fut, E>(&self, key: QueryKey, fetch: F) -> QueryObserver<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: StdError + Send + Sync + 'static,
    {
        let receiver = {
            let mut entries = mutex_lock(&self.inner.entries, SOURCE, "subscribe");
            let now = Instant::now();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(now));
            entry.touch(now);
            entry.observers += 1;
            let fetcher = erase(fetch);
            entry.fetcher = Some(Arc::clone(&fetcher));

            if entry.in_flight.is_none() && entry.is_stale(now, self.inner.config.stale_time) {
                let _ = self.start_fetch(&key, entry, fetcher);
            }
            entry.subscribe()
        };

        QueryObserver {
            client: Arc::downgrade(&self.inner),
            key,
            receiver,
            _marker: PhantomData,
        }
    }

    /// Snapshot the entry for `key` without triggering a fetch.
    pub fn get_query_state<T: Send + Sync + 'static>(&self, key: &QueryKey) -> QueryState<T> {
        let entries = mutex_lock(&self.inner.entries, SOURCE, "get_query_state");
        snapshot(&self.inner.config, key, entries.get(key))
    }

    pub fn get_query_data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        self.get_query_state::<T>(key).data
    }

    /// Replace the cached value for `key`, superseding any in-flight request.
    pub fn set_query_data<T: Send + Sync + 'static>(&self, key: &QueryKey, value: T) {
        let mut entries = mutex_lock(&self.inner.entries, SOURCE, "set_query_data");
        let now = Instant::now();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(now));
        entry.touch(now);
        entry.set_data(Arc::new(value), now);
    }

    /// Mark every entry whose key starts with `prefix` as stale.
    ///
    /// Observed entries are refetched right away; the rest refetch on their
    /// next access. Must be called from within a Tokio runtime.
    #[instrument(skip_all, fields(prefix = %prefix))]
    pub fn invalidate_queries(&self, prefix: &QueryKey) -> usize {
        let mut entries = mutex_lock(&self.inner.entries, SOURCE, "invalidate_queries");
        let mut invalidated = 0usize;
        let mut refetched = 0usize;

        for (key, entry) in entries.iter_mut().filter(|(key, _)| key.starts_with(prefix)) {
            entry.invalidate();
            invalidated += 1;
            if entry.observers > 0
                && let Some(fetcher) = entry.fetcher.clone()
            {
                let _ = self.start_fetch(key, entry, fetcher);
                refetched += 1;
            }
        }

        counter!(METRIC_INVALIDATED_TOTAL).increment(invalidated as u64);
        info!(invalidated, refetched, "Query cache invalidated");
        invalidated
    }

    /// Foreground focus regained: refetch stale entries that are observed or
    /// were read within the retention window, when enabled.
    pub fn on_focus(&self) -> usize {
        if !self.inner.config.refetch_on_window_focus {
            debug!("refetch on focus disabled");
            return 0;
        }

        let mut entries = mutex_lock(&self.inner.entries, SOURCE, "on_focus");
        let now = Instant::now();
        let stale_time = self.inner.config.stale_time;
        let gc_time = self.inner.config.gc_time;
        let mut refetched = 0usize;

        for (key, entry) in entries.iter_mut() {
            let active = entry.observers > 0
                || now.saturating_duration_since(entry.last_access) < gc_time;
            if !active || entry.in_flight.is_some() || !entry.is_stale(now, stale_time) {
                continue;
            }
            if let Some(fetcher) = entry.fetcher.clone() {
                let _ = self.start_fetch(key, entry, fetcher);
                refetched += 1;
            }
        }

        info!(refetched, "Focus refetch issued");
        refetched
    }

    /// Drop unobserved, idle entries whose last access is older than the
    /// retention window.
    pub fn evict_expired(&self) -> usize {
        let mut entries = mutex_lock(&self.inner.entries, SOURCE, "evict_expired");
        let now = Instant::now();
        let gc_time = self.inner.config.gc_time;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_evictable(now, gc_time));
        let evicted = before - entries.len();
        if evicted > 0 {
            counter!(METRIC_EVICTED_TOTAL).increment(evicted as u64);
            debug!(evicted, remaining = entries.len(), "Evicted expired query entries");
        }
        evicted
    }

    /// Tear down every entry and in-flight mutation record.
    pub fn clear(&self) {
        mutex_lock(&self.inner.entries, SOURCE, "clear").clear();
        mutex_lock(&self.inner.mutations, SOURCE, "clear.mutations").clear();
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.inner.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of mutations currently pending.
    pub fn is_mutating(&self) -> usize {
        mutex_lock(&self.inner.mutations, SOURCE, "is_mutating")
            .values()
            .filter(|record| record.status == MutationStatus::Pending)
            .count()
    }

    /// Run a mutation under the mutation retry policy and, on success,
    /// invalidate each prefix in `invalidates`.
    #[instrument(skip(self, invalidates, mutation))]
    pub async fn mutate<T, F, Fut, E>(
        &self,
        name: &'static str,
        invalidates: Vec<QueryKey>,
        mutation: F,
    ) -> Result<T, QueryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + Send + Sync + 'static,
    {
        let record = MutationRecord::new(name, invalidates);
        let id = record.id;
        mutex_lock(&self.inner.mutations, SOURCE, "mutate.begin").insert(id, record);
        self.set_mutation_status(id, MutationStatus::Pending);

        let policy = self.inner.config.mutation_retry;
        let result = with_retry(&policy, "mutation", name, || {
            let fut = mutation();
            async move { fut.await.map_err(|err| Arc::new(err) as FetchFailure) }
        })
        .await;

        let finished = match &result {
            Ok(_) => MutationStatus::Success,
            Err(_) => MutationStatus::Error,
        };
        self.set_mutation_status(id, finished);

        let record = mutex_lock(&self.inner.mutations, SOURCE, "mutate.end").remove(&id);
        if let (Ok(_), Some(record)) = (&result, record) {
            for prefix in &record.invalidates {
                self.invalidate_queries(prefix);
            }
        }

        result
    }

    fn set_mutation_status(&self, id: Uuid, status: MutationStatus) {
        if let Some(record) =
            mutex_lock(&self.inner.mutations, SOURCE, "mutate.status").get_mut(&id)
        {
            record.transition(status);
        }
    }

    fn start_fetch(&self, key: &QueryKey, entry: &mut CacheEntry, fetcher: Fetcher) -> SharedFetch {
        spawn_fetch(&self.inner, key, entry, fetcher)
    }
}

fn spawn_fetch(
    inner: &Arc<Inner>,
    key: &QueryKey,
    entry: &mut CacheEntry,
    fetcher: Fetcher,
) -> SharedFetch {
    let generation = entry.generation;
    let policy = inner.config.query_retry;
    let owner = Arc::downgrade(inner);
    let task_key = key.clone();

    let handle = tokio::spawn(async move {
        let label = task_key.canonical();
        let result = with_retry(&policy, "query", &label, || fetcher()).await;
        if let Some(inner) = owner.upgrade() {
            settle(&inner, &task_key, generation, &result);
        }
        result
    });

    let abort_key = key.canonical();
    let future = async move {
        match handle.await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Aborted { key: abort_key }),
        }
    }
    .boxed()
    .shared();

    entry.begin(future.clone());
    future
}

fn settle(inner: &Inner, key: &QueryKey, generation: u64, result: &Result<Data, QueryError>) {
    let mut entries = mutex_lock(&inner.entries, SOURCE, "settle");
    let Some(entry) = entries.get_mut(key) else {
        debug!(key = %key, "entry removed before fetch settled");
        return;
    };
    if !entry.settle(generation, result, Instant::now()) {
        debug!(
            key = %key,
            generation,
            current = entry.generation,
            "discarding result from superseded generation"
        );
    }
}

fn erase<T, F, Fut, E>(fetch: F) -> Fetcher
where
    T: Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    Arc::new(move || {
        let fut = fetch();
        async move {
            fut.await
                .map(|value| Arc::new(value) as Data)
                .map_err(|err| Arc::new(err) as FetchFailure)
        }
        .boxed()
    })
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, data: Data) -> Result<Arc<T>, QueryError> {
    data.downcast::<T>()
        .map_err(|_| QueryError::TypeMismatch {
            key: key.canonical(),
        })
}

fn snapshot<T: Send + Sync + 'static>(
    config: &CacheConfig,
    key: &QueryKey,
    entry: Option<&CacheEntry>,
) -> QueryState<T> {
    let Some(entry) = entry else {
        return QueryState::idle(key.clone());
    };
    let data = entry
        .data
        .clone()
        .and_then(|data| data.downcast::<T>().ok());
    QueryState {
        key: key.clone(),
        status: entry.status(),
        data,
        error: entry.error.clone(),
        updated_at: entry.data_updated_at,
        is_stale: entry.is_stale(Instant::now(), config.stale_time),
    }
}

/// A live subscription to one key. Dropping it releases the observer slot; a
/// fetch that is still running completes and populates the cache, but this
/// observer no longer sees it.
pub struct QueryObserver<T> {
    client: Weak<Inner>,
    key: QueryKey,
    receiver: watch::Receiver<u64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> QueryObserver<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn state(&self) -> QueryState<T> {
        match self.client.upgrade() {
            Some(inner) => {
                let entries = mutex_lock(&inner.entries, SOURCE, "observer.state");
                snapshot(&inner.config, &self.key, entries.get(&self.key))
            }
            None => QueryState::idle(self.key.clone()),
        }
    }

    /// Wait for the next change to the entry. Returns `false` once the entry
    /// or its cache has been torn down.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Wait until no fetch is outstanding and return the settled snapshot.
    pub async fn settled(&mut self) -> QueryState<T> {
        loop {
            let state = self.state();
            if !state.is_fetching() {
                return state;
            }
            if !self.changed().await {
                return self.state();
            }
        }
    }
}

impl<T> Drop for QueryObserver<T> {
    fn drop(&mut self) {
        let Some(inner) = self.client.upgrade() else {
            return;
        };
        let mut entries = mutex_lock(&inner.entries, SOURCE, "observer.drop");
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.observers = entry.observers.saturating_sub(1);
            entry.touch(Instant::now());
        }
    }
}
