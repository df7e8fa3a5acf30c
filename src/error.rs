// =============================================================================
// ERROR MODULE
// =============================================================================
// Error types for the HTTP layer and their JSON responses.
//
// NOTES:
// - The normalization core never fails; it degrades to defaults. Everything
//   here comes from talking to the spreadsheet endpoints or from the caller
// - Upstream trouble maps to 502, business-rule refusals from the sheet
//   script to 422 with the script's message passed through untouched
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

/// Longest upstream body echoed back in an error message
const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum AppError {
    // -------------------------------------------------------------------------
    // UPSTREAM ERRORS
    // -------------------------------------------------------------------------
    /// The request to a source never produced a response
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// A source answered with a non-2xx status
    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    /// A source answered with something we cannot read
    #[error("Unreadable upstream response: {0}")]
    UpstreamFormat(String),

    // -------------------------------------------------------------------------
    // BUSINESS LOGIC ERRORS
    // -------------------------------------------------------------------------
    /// `{ok: false, error}` from the sheet script
    #[error("{0}")]
    Remote(String),

    /// No department row scored for the show
    #[error("No {department} row found")]
    NoMatch { department: String, tried: Vec<String> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The checkout session already has a submission on the wire
    #[error("A submission is already in progress for this session")]
    SubmissionInFlight,

    // -------------------------------------------------------------------------
    // INTERNAL ERRORS
    // -------------------------------------------------------------------------
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Non-2xx upstream answer, keeping only the start of the body.
    pub fn upstream_status(status: u16, body: &str) -> Self {
        AppError::UpstreamStatus {
            status,
            body: body.chars().take(BODY_PREVIEW_CHARS).collect(),
        }
    }
}

// =============================================================================
// HTTP RESPONSE CONVERSION
// =============================================================================
impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Upstream(_) | AppError::UpstreamStatus { .. } | AppError::UpstreamFormat(_) => {
                StatusCode::BAD_GATEWAY
            }
            // the script understood us and said no
            AppError::Remote(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NoMatch { .. } | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::SubmissionInFlight => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::UpstreamStatus { .. } => "UPSTREAM_STATUS",
            AppError::UpstreamFormat(_) => "UPSTREAM_FORMAT",
            AppError::Remote(_) => "REMOTE_REJECTED",
            AppError::NoMatch { .. } => "NO_MATCH",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::SubmissionInFlight => "SUBMISSION_IN_FLIGHT",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Remote messages must reach the user exactly as the script wrote them
        let message = match &self {
            AppError::Upstream(err) => format!("Source request failed: {err}"),
            AppError::UpstreamStatus { status, .. } => format!("Source returned HTTP {status}"),
            AppError::UpstreamFormat(msg)
            | AppError::Remote(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::NoMatch { .. } | AppError::SubmissionInFlight => self.to_string(),
        };

        if let AppError::UpstreamStatus { body, .. } = &self {
            tracing::error!(error_code, message = %message, body = %body, "Request failed");
        } else {
            tracing::error!(error_code, message = %message, "Request failed");
        }

        let body = match self {
            AppError::NoMatch { tried, .. } => ErrorResponse::with_details(error_code, message, tried),
            _ => ErrorResponse::new(error_code, message),
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
