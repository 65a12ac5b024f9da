use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::fallback::AllModelsFailed;

/// Application error types surfaced at the HTTP edge
#[derive(Debug)]
pub enum AppError {
    /// Malformed client input (bad JSON, missing prompt text)
    ValidationError(String),
    /// Every candidate model failed
    AllModelsFailed(AllModelsFailed),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationError(msg) => write!(f, "Invalid request: {}", msg),
            Self::AllModelsFailed(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::AllModelsFailed(_) => StatusCode::BAD_GATEWAY,
        };

        let mut error = json!({
            "message": self.to_string(),
            "type": error_type_name(&self),
        });

        // Per-model causes only; a failed generation never reports token metrics
        if let Self::AllModelsFailed(err) = &self {
            error["attempts"] = json!(err
                .failures
                .iter()
                .map(|f| json!({ "model": f.model, "error": f.cause.to_string() }))
                .collect::<Vec<_>>());
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

pub fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::ValidationError(_) => "validation_error",
        AppError::AllModelsFailed(_) => "all_models_failed",
    }
}

impl From<AllModelsFailed> for AppError {
    fn from(err: AllModelsFailed) -> Self {
        Self::AllModelsFailed(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::ValidationError(format!("malformed JSON body: {}", err))
    }
}
