//! Error taxonomy and its single translation to HTTP.
//!
//! Every failure that can reach a client is one of the kinds below. Business
//! logic never picks status codes; `IntoResponse for AppError` is the only
//! place that knows them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::transform::options::OptionError;
use crate::transform::TransformError;
use crate::validation::ValidationError;

/// Fixed text for failures whose cause must not leak.
pub const INTERNAL_DETAIL: &str = "Internal server error";

/// Client-visible failure kinds.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    UnsupportedType(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    EmptyPayload(String),

    #[error("{0}")]
    MalformedContent(String),

    #[error("{0}")]
    InvalidParameter(String),

    #[error("{0}")]
    PageOutOfRange(String),

    #[error("{0}")]
    IncorrectCredential(String),

    #[error("{0}")]
    ConversionTimeout(String),

    #[error("{0}")]
    ConversionFailure(String),

    #[error("{0}")]
    EmptyResult(String),

    #[error("Not Found")]
    NotFound,

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    pub fn invalid(detail: impl Into<String>) -> Self {
        AppError::InvalidParameter(detail.into())
    }

    /// HTTP status for this kind.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::EmptyPayload(_)
            | AppError::MalformedContent(_)
            | AppError::InvalidParameter(_)
            | AppError::PageOutOfRange(_)
            | AppError::EmptyResult(_) => StatusCode::BAD_REQUEST,
            AppError::IncorrectCredential(_) => StatusCode::UNAUTHORIZED,
            AppError::ConversionTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::ConversionFailure(_) | AppError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Stable kind name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::UnsupportedType(_) => "unsupported_type",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::EmptyPayload(_) => "empty_payload",
            AppError::MalformedContent(_) => "malformed_content",
            AppError::InvalidParameter(_) => "invalid_parameter",
            AppError::PageOutOfRange(_) => "page_out_of_range",
            AppError::IncorrectCredential(_) => "incorrect_credential",
            AppError::ConversionTimeout(_) => "conversion_timeout",
            AppError::ConversionFailure(_) => "conversion_failure",
            AppError::EmptyResult(_) => "empty_result",
            AppError::NotFound => "not_found",
            AppError::Internal => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(kind = self.kind(), status = status.as_u16(), "Request failed");
        }
        let detail = match &self {
            AppError::Internal => INTERNAL_DETAIL.to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        let detail = err.to_string();
        match err {
            ValidationError::UnsupportedType { .. } => AppError::UnsupportedType(detail),
            ValidationError::PayloadTooLarge { .. } => AppError::PayloadTooLarge(detail),
            ValidationError::EmptyPayload => AppError::EmptyPayload(detail),
            ValidationError::MalformedContent { .. } => AppError::MalformedContent(detail),
        }
    }
}

impl From<OptionError> for AppError {
    fn from(err: OptionError) -> Self {
        AppError::InvalidParameter(err.0)
    }
}

impl From<TransformError> for AppError {
    fn from(err: TransformError) -> Self {
        let detail = err.to_string();
        match err {
            TransformError::InvalidParameter(_) => AppError::InvalidParameter(detail),
            TransformError::PageOutOfRange { .. } => AppError::PageOutOfRange(detail),
            TransformError::IncorrectCredential => AppError::IncorrectCredential(detail),
            TransformError::Timeout(_) => AppError::ConversionTimeout(detail),
            TransformError::EmptyResult(_) => AppError::EmptyResult(detail),
            TransformError::Failure(_) | TransformError::ToolUnavailable => {
                AppError::ConversionFailure(detail)
            }
            TransformError::Cancelled => AppError::Internal,
        }
    }
}
