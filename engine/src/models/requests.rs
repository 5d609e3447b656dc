use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Pharmacist request to hand out an active prescription.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DispenseRequest {
    pub patient_id: String,
    pub prescription_id: String,
    pub pharmacist_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DispenseRequest {
    pub fn validate(&self) -> Result<(), EngineError> {
        require("patientId", &self.patient_id)?;
        require("prescriptionId", &self.prescription_id)?;
        require("pharmacistId", &self.pharmacist_id)
    }
}

/// Doctor request to revoke one of their own active prescriptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RevokeRequest {
    pub patient_id: String,
    pub prescription_id: String,
    pub doctor_id: String,
}

impl RevokeRequest {
    pub fn validate(&self) -> Result<(), EngineError> {
        require("patientId", &self.patient_id)?;
        require("prescriptionId", &self.prescription_id)?;
        require("doctorId", &self.doctor_id)
    }
}

/// Reporting window passed to analytics. Accepted but not applied: the
/// analytics scan always covers the whole ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

pub(crate) fn require(field: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(field, format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispense_request_requires_all_ids() {
        let request = DispenseRequest {
            patient_id: "P1".to_string(),
            prescription_id: "RX1".to_string(),
            pharmacist_id: " ".to_string(),
            note: None,
        };

        match request.validate() {
            Err(EngineError::Validation { field, .. }) => assert_eq!(field, "pharmacistId"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_revoke_request_wire_names() {
        let json = r#"{"patientId": "P1", "prescriptionId": "RX1", "doctorId": "D1"}"#;
        let request: RevokeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.doctor_id, "D1");
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_dispense_note_is_optional() {
        let json = r#"{"patientId": "P1", "prescriptionId": "RX1", "pharmacistId": "Ph1"}"#;
        let request: DispenseRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.note, None);
        assert!(!serde_json::to_string(&request).unwrap().contains("note"));
    }
}
