use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;

/// Reasons a session operation is refused. A refused operation leaves the session untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session already submitted")]
    Locked,
    #[error("grading in progress")]
    Finishing,
    #[error("time has expired")]
    TimeExpired,
    #[error("no question with id {0}")]
    UnknownQuestion(String),
    #[error("option {index} out of range for {len} options")]
    OptionOutOfRange { index: usize, len: usize },
    #[error("no option selected")]
    NoSelection,
    #[error("question is already being validated")]
    AlreadyValidating,
    #[error("question is already validated")]
    AlreadyValidated,
    #[error("operation is not available in {0} mode")]
    WrongMode(&'static str),
    #[error("session has already been submitted")]
    AlreadySubmitted,
    #[error("no questions loaded")]
    Empty,
    #[error("questions already loaded; reset first")]
    AlreadyLoaded,
    #[error("grading task stopped before completing")]
    Interrupted,
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Locked | Self::AlreadySubmitted => "SESSION_SUBMITTED",
            Self::Finishing => "FINISH_IN_PROGRESS",
            Self::TimeExpired => "TIME_EXPIRED",
            Self::UnknownQuestion(_) => "NOT_FOUND",
            Self::OptionOutOfRange { .. } | Self::NoSelection => "VALIDATION_ERROR",
            Self::AlreadyValidating | Self::AlreadyValidated => "ALREADY_GRADED",
            Self::WrongMode(_) => "WRONG_MODE",
            Self::Empty => "EMPTY_SESSION",
            Self::AlreadyLoaded => "CONFLICT",
            Self::Interrupted => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownQuestion(_) => StatusCode::NOT_FOUND,
            Self::OptionOutOfRange { .. } | Self::NoSelection | Self::WrongMode(_) | Self::Empty => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Interrupted => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::CONFLICT,
        }
    }
}

/// Failures of a grading client call. All of them are recoverable for the session.
#[derive(Debug, thiserror::Error)]
pub enum GradingError {
    #[error("grading request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("grading request timed out")]
    Timeout,
    #[error("grading service answered {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("grading service returned empty content")]
    EmptyResponse,
    #[error("grading response is not valid json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("grading response does not match schema: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub field: String,
    pub issue: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: ErrorPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
    pub request_id: String,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Vec<ErrorDetail>,
    pub request_id: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Vec::new(),
            request_id: request_id.into(),
        }
    }

    pub fn session(err: SessionError, request_id: impl Into<String>) -> Self {
        Self::new(err.status(), err.code(), err.to_string(), request_id)
    }

    pub fn session_not_found(request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "session not found", request_id)
    }

    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details = details;
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let payload = ErrorBody {
            error: ErrorPayload {
                code: self.code,
                message: self.message,
                details: self.details,
                request_id: self.request_id,
            },
        };
        (self.status, Json(payload)).into_response()
    }
}
