use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Error produced by a fetcher or mutation function, shared between every
/// caller waiting on the same request.
pub type FetchFailure = Arc<dyn StdError + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("request failed after {attempts} attempt(s): {message}")]
    Failed {
        attempts: u32,
        message: String,
        cause: FetchFailure,
    },
    #[error("cached value for `{key}` has an unexpected type")]
    TypeMismatch { key: String },
    #[error("request for `{key}` was aborted")]
    Aborted { key: String },
}

impl QueryError {
    pub fn attempts(&self) -> u32 {
        match self {
            QueryError::Failed { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// Downcast the underlying failure, if it has the given concrete type.
    pub fn cause_as<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            QueryError::Failed { cause, .. } => cause.downcast_ref::<E>(),
            _ => None,
        }
    }
}
