//! Per-session query caches.
//!
//! Each authenticated identity owns exactly one [`QueryClient`], created on
//! first use and torn down on logout or once its session has expired.

use std::sync::Arc;

use dashmap::DashMap;
use metrics::gauge;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::client::QueryClient;
use super::config::CacheConfig;
use crate::domain::session::Session;

const METRIC_SESSION_CACHES: &str = "gymdesk_session_caches";

struct SessionCache {
    client: QueryClient,
    expires_at: Option<OffsetDateTime>,
}

#[derive(Clone)]
pub struct SessionCaches {
    config: CacheConfig,
    clients: Arc<DashMap<String, SessionCache>>,
}

impl SessionCaches {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            clients: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache for an authenticated session, remembering when it expires.
    pub fn open(&self, session: &Session) -> QueryClient {
        let client = {
            let mut cache = self
                .clients
                .entry(session.identity.clone())
                .or_insert_with(|| {
                    debug!(identity = %session.identity, "creating session query cache");
                    SessionCache {
                        client: QueryClient::new(self.config.clone()),
                        expires_at: None,
                    }
                });
            cache.expires_at = session.expires_at;
            cache.client.clone()
        };
        self.record_len();
        client
    }

    pub fn get(&self, identity: &str) -> Option<QueryClient> {
        self.clients.get(identity).map(|cache| cache.client.clone())
    }

    /// Drop the session's cache. Returns `true` when one existed.
    pub fn end_session(&self, identity: &str) -> bool {
        match self.clients.remove(identity) {
            Some((_, cache)) => {
                cache.client.clear();
                self.record_len();
                info!(identity, "session query cache torn down");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(OffsetDateTime::now_utc())
    }

    /// Drop caches whose session expired before `now`, evict expired entries
    /// in the rest and drop caches left empty. Returns the evicted entry count.
    pub fn sweep_at(&self, now: OffsetDateTime) -> usize {
        let lapsed: Vec<String> = self
            .clients
            .iter()
            .filter(|cache| cache.expires_at.is_some_and(|expires| expires <= now))
            .map(|cache| cache.key().clone())
            .collect();
        for identity in &lapsed {
            self.end_session(identity);
        }

        let mut evicted = 0;
        for cache in self.clients.iter() {
            evicted += cache.client.evict_expired();
        }
        self.clients
            .retain(|_, cache| !cache.client.is_empty() || cache.client.is_mutating() > 0);
        self.record_len();
        evicted
    }

    fn record_len(&self) {
        gauge!(METRIC_SESSION_CACHES).set(self.clients.len() as f64);
    }

    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let caches = self.clone();
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = caches.sweep();
                if evicted > 0 {
                    debug!(evicted, sessions = caches.len(), "query cache sweep");
                }
            }
        })
    }
}
