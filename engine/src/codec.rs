//! JSON encoding of ledger values and inbound payloads.

use serde::de::DeserializeOwned;

use crate::error::EngineError;
use crate::models::PatientRecord;

pub fn encode(record: &PatientRecord) -> Result<Vec<u8>, EngineError> {
    serde_json::to_vec(record).map_err(|source| EngineError::Parse {
        subject: "patient record",
        source,
    })
}

pub fn decode(bytes: &[u8]) -> Result<PatientRecord, EngineError> {
    parse_payload("patient record", bytes)
}

/// Decodes a caller-supplied payload, tagging failures with `subject`.
pub fn parse_payload<T: DeserializeOwned>(
    subject: &'static str,
    bytes: &[u8],
) -> Result<T, EngineError> {
    serde_json::from_slice(bytes).map_err(|source| EngineError::Parse { subject, source })
}
