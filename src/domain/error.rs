use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown role `{0}`")]
    UnknownRole(String),
}
