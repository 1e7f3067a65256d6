//! Session-scoped data synchronisation and route authorisation for the
//! gymdesk admin panel.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
