use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

// Failure talking to one of the third-party APIs
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    // Non-2xx answer; keeps whatever JSON came back
    #[error("upstream returned {status}")]
    Status { status: u16, body: Option<Value> },

    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl UpstreamError {
    pub fn details(&self) -> Value {
        match self {
            UpstreamError::Status { body: Some(body), .. } => body.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("An order was already placed from this {kind} recently. Please try again later.")]
    DuplicateOrder { kind: &'static str },

    #[error("Order service is temporarily unavailable. Please try again shortly.")]
    GuardUnavailable,

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{message}")]
    Upstream {
        message: &'static str,
        #[source]
        source: UpstreamError,
    },

    #[error("{0} is not configured")]
    Misconfigured(&'static str),

    #[error("Server failed")]
    Internal(String),
}

impl AppError {
    pub fn upstream(message: &'static str) -> impl FnOnce(UpstreamError) -> Self {
        move |source| AppError::Upstream { message, source }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateOrder { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::GuardUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Upstream { .. }
            | AppError::Misconfigured(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            AppError::Upstream { source, .. } => {
                json!({ "error": self.to_string(), "details": source.details() })
            }
            AppError::Internal(details) => json!({ "error": self.to_string(), "details": details }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
