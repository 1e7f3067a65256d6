//! Application services: remote API contract, resource hooks, session
//! resolution and route guarding.

pub mod api;
pub mod error;
pub mod guard;
pub mod resources;
pub mod session;
