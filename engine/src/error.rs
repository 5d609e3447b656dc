use thiserror::Error;

use crate::ledger::LedgerError;
use crate::models::PrescriptionStatus;

/// Every failure an engine operation can surface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to parse {subject}: {source}")]
    Parse {
        subject: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("unauthorized: {0}")]
    Authorization(String),

    #[error("prescription {prescription_id}: {conflict}")]
    StateConflict {
        prescription_id: String,
        conflict: Conflict,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Status precondition that a transition found violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("cannot dispense a revoked prescription")]
    DispenseRevoked,
    #[error("can only dispense active prescriptions (status is {0})")]
    DispenseNotActive(PrescriptionStatus),
    #[error("can only revoke active prescriptions (status is {0})")]
    RevokeNotActive(PrescriptionStatus),
    #[error("status cannot move from {from} to {to}")]
    ReopenViaUpdate {
        from: PrescriptionStatus,
        to: PrescriptionStatus,
    },
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn record_not_found(patient_id: impl Into<String>) -> Self {
        EngineError::NotFound {
            resource: "patient record",
            id: patient_id.into(),
        }
    }

    pub fn prescription_not_found(prescription_id: impl Into<String>) -> Self {
        EngineError::NotFound {
            resource: "prescription",
            id: prescription_id.into(),
        }
    }

    pub fn conflict(prescription_id: impl Into<String>, conflict: Conflict) -> Self {
        EngineError::StateConflict {
            prescription_id: prescription_id.into(),
            conflict,
        }
    }

    /// Short machine-readable tag for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Parse { .. } => "parse",
            EngineError::Validation { .. } => "validation",
            EngineError::NotFound { .. } => "not-found",
            EngineError::Authorization(_) => "authorization",
            EngineError::StateConflict { .. } => "state-conflict",
            EngineError::Ledger(LedgerError::Conflict { .. }) => "write-conflict",
            EngineError::Ledger(_) => "ledger",
        }
    }
}
