use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::api::ApiError;
use crate::application::error::ErrorReport;
use crate::application::resources::ResourceError;
use crate::cache::QueryError;
use crate::domain::validation::{FieldError, FieldErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationFailed,
    NotFound,
    UpstreamUnavailable,
    UpstreamRejected,
    Internal,
}

#[derive(Debug, Serialize)]
pub struct ViewErrorBody {
    pub error: ViewErrorMessage,
}

#[derive(Debug, Serialize)]
pub struct ViewErrorMessage {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

/// JSON error response for guarded views.
#[derive(Debug)]
pub struct ViewError {
    status: StatusCode,
    code: ErrorCode,
    message: String,
    fields: Vec<FieldError>,
    chain: Vec<String>,
}

impl ViewError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            fields: Vec::new(),
            chain: Vec::new(),
        }
    }

    pub fn validation(errors: &FieldErrors) -> Self {
        let mut error = Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::ValidationFailed,
            "Request could not be processed",
        );
        error.fields = errors.iter().cloned().collect();
        error.chain.push(errors.to_string());
        error
    }

    pub fn from_query(err: &QueryError) -> Self {
        let mut error = match err.cause_as::<ApiError>() {
            Some(ApiError::Status { status: 404, message }) => {
                Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, message.clone())
            }
            Some(ApiError::Status { status, message }) if (400..500).contains(status) => {
                Self::new(StatusCode::BAD_GATEWAY, ErrorCode::UpstreamRejected, message.clone())
            }
            Some(_) | None if matches!(err, QueryError::Failed { .. }) => Self::new(
                StatusCode::BAD_GATEWAY,
                ErrorCode::UpstreamUnavailable,
                "Upstream service unavailable",
            ),
            _ => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::Internal,
                "Unexpected error occurred",
            ),
        };
        error.chain.push(err.to_string());
        error
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ResourceError> for ViewError {
    fn from(err: ResourceError) -> Self {
        match &err {
            ResourceError::Validation(errors) => Self::validation(errors),
            ResourceError::Query(query) => Self::from_query(query),
        }
    }
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        let report = if self.chain.is_empty() {
            ErrorReport::from_message("infra::http::views", self.status, self.message.clone())
        } else {
            ErrorReport {
                source: "infra::http::views",
                status: self.status,
                messages: self.chain,
            }
        };
        let body = ViewErrorBody {
            error: ViewErrorMessage {
                code: self.code,
                message: self.message,
                fields: self.fields,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}
