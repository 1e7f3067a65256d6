//! Domain layer types and invariants.

pub mod access;
pub mod error;
pub mod session;
pub mod validation;
