use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::record::{PatientRecord, Prescription, PrescriptionStatus};

/// One historical version of a patient record as committed to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub patient_id: String,
    pub patient_name: String,
    pub doctor_id: String,
    pub last_updated: DateTime<Utc>,
    pub prescriptions: Vec<PrescriptionSnapshot>,
    /// Commit time of this version.
    pub timestamp: DateTime<Utc>,
    pub tx_id: String,
}

impl HistoryEntry {
    pub fn from_version(
        record: &PatientRecord,
        timestamp: DateTime<Utc>,
        tx_id: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: record.patient_id.clone(),
            patient_name: record.patient_name.clone(),
            doctor_id: record.doctor_id.clone(),
            last_updated: record.last_updated,
            prescriptions: record
                .prescriptions
                .iter()
                .map(PrescriptionSnapshot::from)
                .collect(),
            timestamp,
            tx_id: tx_id.into(),
        }
    }
}

/// Prescription fields carried in a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionSnapshot {
    pub prescription_id: String,
    pub medication_name: String,
    pub dosage: String,
    pub instructions: String,
    pub diagnosis: String,
    pub status: PrescriptionStatus,
    pub created_by: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
}

impl From<&Prescription> for PrescriptionSnapshot {
    fn from(p: &Prescription) -> Self {
        Self {
            prescription_id: p.prescription_id.clone(),
            medication_name: p.medication_name.clone(),
            dosage: p.dosage.clone(),
            instructions: p.instructions.clone(),
            diagnosis: p.diagnosis.clone(),
            status: p.status,
            created_by: p.created_by.clone(),
            timestamp: p.timestamp,
            expiry_date: p.expiry_date,
        }
    }
}

/// A prescription written by one doctor, flattened out of its record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DoctorPrescriptionView {
    pub prescription_id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub medication_name: String,
    pub dosage: String,
    pub instructions: String,
    pub diagnosis: String,
    pub status: PrescriptionStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(rename = "TxID")]
    pub tx_id: String,
}

/// A prescription handed out by one pharmacist, flattened out of its record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DispenseRecord {
    pub prescription_id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub medication_name: String,
    pub dosage: String,
    pub instructions: String,
    pub diagnosis: String,
    pub status: PrescriptionStatus,
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispensing_timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "TxID")]
    pub tx_id: String,
}

/// Aggregate counters over every prescription in the ledger.
///
/// Revoked prescriptions count towards the total only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub total_prescriptions: u64,
    pub active_count: u64,
    pub dispensed_count: u64,
    pub expired_count: u64,
    pub medication_frequency: BTreeMap<String, u64>,
    pub diagnosis_frequency: BTreeMap<String, u64>,
}

/// Result of an explicit expiry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "status", rename_all = "camelCase")]
pub enum ExpiryOutcome {
    /// The prescription was active and past its expiry date; it is now expired.
    Expired,
    /// Expiry date not reached yet. Nothing changed.
    NotYetDue,
    /// Past expiry but already terminal. Nothing changed.
    AlreadyTerminal(PrescriptionStatus),
}
