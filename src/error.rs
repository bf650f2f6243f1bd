use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Malformed workbook: {0}")]
    MalformedFile(String),
    #[error("Grammar service error: {0}")]
    GrammarService(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("HTTP Error: {0}")]
    HttpError(String),
    #[error("Request too large: {0}")]
    PayloadTooLarge(String),
}

impl AppError {
    /// Stable tag used when a failure is reported per file.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::MalformedFile(_) => "malformed_file",
            AppError::GrammarService(_) => "grammar_service",
            AppError::Serialization(_) => "serialization",
            AppError::HttpError(_) => "http",
            AppError::PayloadTooLarge(_) => "payload_too_large",
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge(err.body_text())
        } else {
            AppError::HttpError(err.body_text())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::HttpError(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::MalformedFile(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::GrammarService(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}
