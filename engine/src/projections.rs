//! Read-side views derived from stored patient records.

use chrono::{DateTime, Utc};

use crate::codec;
use crate::error::EngineError;
use crate::ledger::{KeyModification, LedgerEntry};
use crate::models::{
    AnalyticsReport, DispenseRecord, DoctorPrescriptionView, HistoryEntry, PatientRecord,
    Prescription, PrescriptionStatus,
};

const NOT_SPECIFIED: &str = "Not specified";

pub fn by_status(record: &PatientRecord, status: PrescriptionStatus) -> Vec<Prescription> {
    record
        .prescriptions
        .iter()
        .filter(|p| p.status == status)
        .cloned()
        .collect()
}

/// Narrows `record` to the prescriptions written by `caller_id`.
pub fn for_prescriber(mut record: PatientRecord, caller_id: &str) -> PatientRecord {
    record.prescriptions.retain(|p| p.created_by == caller_id);
    record
}

/// Projects one history item. A deletion marker becomes an entry with empty
/// record fields.
pub fn history_entry(modification: &KeyModification) -> Result<HistoryEntry, EngineError> {
    let record = match &modification.value {
        Some(bytes) => codec::decode(bytes)?,
        None => PatientRecord::default(),
    };
    Ok(HistoryEntry::from_version(
        &record,
        modification.timestamp,
        modification.tx_id.clone(),
    ))
}

/// Decodes scanned values, skipping any that are malformed.
pub fn decode_scan(entries: Vec<LedgerEntry>) -> Vec<PatientRecord> {
    entries
        .into_iter()
        .filter_map(|entry| match codec::decode(&entry.value) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(key = %entry.key, error = %err, "skipping malformed record");
                None
            }
        })
        .collect()
}

fn or_placeholder(value: &str, placeholder: &str) -> String {
    if value.is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    }
}

/// Prescriptions in `record` written by `doctor_id`. Prescriptions without an
/// id are left out, and an unset timestamp reads as `now`.
pub fn doctor_views(
    record: &PatientRecord,
    doctor_id: &str,
    now: DateTime<Utc>,
) -> Vec<DoctorPrescriptionView> {
    record
        .prescriptions
        .iter()
        .filter(|p| p.created_by == doctor_id && !p.prescription_id.is_empty())
        .map(|p| DoctorPrescriptionView {
            prescription_id: p.prescription_id.clone(),
            patient_id: record.patient_id.clone(),
            patient_name: or_placeholder(&record.patient_name, "Unknown"),
            medication_name: or_placeholder(&p.medication_name, NOT_SPECIFIED),
            dosage: or_placeholder(&p.dosage, NOT_SPECIFIED),
            instructions: or_placeholder(&p.instructions, NOT_SPECIFIED),
            diagnosis: or_placeholder(&p.diagnosis, NOT_SPECIFIED),
            status: p.status,
            timestamp: if p.timestamp == DateTime::<Utc>::default() {
                now
            } else {
                p.timestamp
            },
            expiry_date: p.expiry_date,
            tx_id: or_placeholder(&p.tx_id, "Not available"),
        })
        .collect()
}

pub fn dispense_records(record: &PatientRecord, pharmacist_id: &str) -> Vec<DispenseRecord> {
    record
        .prescriptions
        .iter()
        .filter(|p| p.dispensing_pharmacist.as_deref() == Some(pharmacist_id))
        .map(|p| DispenseRecord {
            prescription_id: p.prescription_id.clone(),
            patient_id: record.patient_id.clone(),
            patient_name: record.patient_name.clone(),
            medication_name: p.medication_name.clone(),
            dosage: p.dosage.clone(),
            instructions: p.instructions.clone(),
            diagnosis: p.diagnosis.clone(),
            status: p.status,
            created_by: p.created_by.clone(),
            dispensing_timestamp: p.dispensing_timestamp,
            tx_id: p.tx_id.clone(),
        })
        .collect()
}

impl AnalyticsReport {
    pub fn add_record(&mut self, record: &PatientRecord) {
        for p in &record.prescriptions {
            self.total_prescriptions += 1;
            *self
                .medication_frequency
                .entry(p.medication_name.clone())
                .or_default() += 1;
            *self
                .diagnosis_frequency
                .entry(p.diagnosis.clone())
                .or_default() += 1;

            match p.status {
                PrescriptionStatus::Active => self.active_count += 1,
                PrescriptionStatus::Dispensed => self.dispensed_count += 1,
                PrescriptionStatus::Expired => self.expired_count += 1,
                PrescriptionStatus::Revoked => {}
            }
        }
    }
}

pub fn analytics<'a>(records: impl IntoIterator<Item = &'a PatientRecord>) -> AnalyticsReport {
    records
        .into_iter()
        .fold(AnalyticsReport::default(), |mut report, record| {
            report.add_record(record);
            report
        })
}
