//! API error types and conversions

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::{analysis::AnalysisError, balancer::BalancerError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// Not enough samples to answer the request
    InsufficientData(String),

    InvalidRequest(String),

    NotFound(String),

    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::InsufficientData(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::InsufficientData { .. } => ApiError::InsufficientData(err.to_string()),
        }
    }
}

impl From<BalancerError> for ApiError {
    fn from(err: BalancerError) -> Self {
        match err {
            BalancerError::UnknownInstance(_) => ApiError::NotFound(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
