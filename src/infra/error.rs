use thiserror::Error;

/// Failures while wiring or running the server process.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("failed to bind or serve: {0}")]
    Io(#[from] std::io::Error),
    #[error("tracing setup failed: {0}")]
    Telemetry(String),
    #[error("client setup failed: {message}")]
    Configuration { message: String },
}

impl InfraError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
