//! Client-side query cache.
//!
//! - **Keys** (`keys.rs`): hierarchical, deterministic query keys and the
//!   per-resource key factories.
//! - **Client** (`client.rs`): the coordinator that owns every entry and
//!   applies freshness, retention, retry, dedup and invalidation policy.
//! - **Sessions** (`sessions.rs`): one client per authenticated identity.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `gymdesk.toml`:
//!
//! ```toml
//! [cache]
//! stale_seconds = 300
//! gc_seconds = 1800
//! query_attempts = 3
//! mutation_attempts = 1
//! # ... see config/mod.rs for all options
//! ```

mod client;
mod config;
mod entry;
mod error;
pub mod keys;
mod lock;
mod mutation;
mod retry;
mod sessions;

pub use client::{QueryClient, QueryObserver, QueryState};
pub use config::{CacheConfig, RetryPolicy};
pub use entry::QueryStatus;
pub use error::{FetchFailure, QueryError};
pub use keys::{KeyParams, KeySegment, QueryKey};
pub use mutation::{MutationRecord, MutationStatus};
pub use sessions::SessionCaches;
