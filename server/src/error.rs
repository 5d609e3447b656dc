use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use prescription_engine::{EngineError, LedgerError};
use serde::{Deserialize, Serialize};

/// JSON body returned with every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorOutcome {
    pub code: String,
    pub diagnostics: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ErrorOutcome {
    pub fn new(code: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            diagnostics: diagnostics.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub outcome: ErrorOutcome,
}

impl ApiError {
    pub fn invalid_patch(message: impl std::fmt::Display) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            outcome: ErrorOutcome::new("validation", format!("failed to apply patch: {}", message)),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::Parse { .. } | EngineError::Validation { .. } => StatusCode::BAD_REQUEST,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::Authorization(_) => StatusCode::FORBIDDEN,
            EngineError::StateConflict { .. } | EngineError::Ledger(LedgerError::Conflict { .. }) => {
                StatusCode::CONFLICT
            }
            EngineError::Ledger(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let location = match &err {
            EngineError::Validation { field, .. } => Some(field.clone()),
            EngineError::NotFound { resource, id } => Some(format!("{}/{}", resource, id)),
            EngineError::StateConflict {
                prescription_id, ..
            } => Some(format!("prescription/{}", prescription_id)),
            EngineError::Ledger(LedgerError::Conflict { key }) => Some(key.clone()),
            _ => None,
        };

        if status.is_server_error() {
            tracing::error!(error = %err, "ledger unavailable");
        } else {
            tracing::debug!(error = %err, kind = err.kind(), "request rejected");
        }

        let outcome = ErrorOutcome::new(err.kind(), err.to_string());
        let outcome = match location {
            Some(location) => outcome.with_location(location),
            None => outcome,
        };
        Self { status, outcome }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.outcome)).into_response()
    }
}
