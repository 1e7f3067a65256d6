//! Infrastructure adapters and runtime bootstrap.

pub mod api_client;
pub mod auth;
pub mod error;
pub mod http;
pub mod telemetry;
