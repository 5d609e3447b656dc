//! Creating patient records and folding new prescriptions into them.

use chrono::{DateTime, Months, NaiveDate, Utc};

use crate::error::EngineError;
use crate::ids::IdSource;
use crate::lifecycle::{self, Stamp};
use crate::models::{requests::require, PatientRecord, Prescription, PrescriptionStatus};

/// Months a prescription stays valid when the prescriber gives no expiry date.
pub const DEFAULT_VALIDITY_MONTHS: u32 = 1;

pub fn validate_incoming(incoming: &PatientRecord) -> Result<(), EngineError> {
    require("PatientId", &incoming.patient_id)?;
    require("DoctorId", &incoming.doctor_id)
}

/// One month after `now`, clamped to the end of a shorter month.
pub fn default_expiry(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today
        .checked_add_months(Months::new(DEFAULT_VALIDITY_MONTHS))
        .unwrap_or(today)
}

/// Prepares a caller-supplied prescription for storage.
fn stamp_new(
    prescription: &mut Prescription,
    doctor_id: &str,
    stamp: &Stamp<'_>,
    ids: &dyn IdSource,
) -> Result<(), EngineError> {
    if prescription.diagnosis.trim().is_empty() {
        return Err(EngineError::validation(
            "Diagnosis",
            "diagnosis is required for all prescriptions",
        ));
    }
    if prescription.prescription_id.trim().is_empty() {
        prescription.prescription_id = ids.next_id();
    }

    prescription.status = PrescriptionStatus::Active;
    prescription.created_by = doctor_id.to_string();
    if prescription.expiry_date.is_none() {
        prescription.expiry_date = Some(default_expiry(stamp.now));
    }
    stamp.apply(prescription);
    Ok(())
}

/// Builds the record to store for `incoming`.
///
/// Without an existing record the incoming one is stored as-is; otherwise its
/// prescriptions are appended after the existing ones, which stay untouched.
/// Any prescription without a diagnosis fails the whole merge. Callers run
/// [`validate_incoming`] first.
pub fn merge(
    existing: Option<PatientRecord>,
    mut incoming: PatientRecord,
    stamp: &Stamp<'_>,
    ids: &dyn IdSource,
) -> Result<PatientRecord, EngineError> {
    for prescription in incoming.prescriptions.iter_mut() {
        stamp_new(prescription, &incoming.doctor_id, stamp, ids)?;
    }

    let mut record = match existing {
        Some(mut record) => {
            record.prescriptions.append(&mut incoming.prescriptions);
            record
        }
        None => incoming,
    };
    record.touch(stamp.now);
    Ok(record)
}

/// Replaces the first prescription whose id matches `incoming` wholesale,
/// keeping only the stored `created_by`.
pub fn replace_prescription(
    record: &mut PatientRecord,
    mut incoming: Prescription,
    stamp: &Stamp<'_>,
) -> Result<(), EngineError> {
    let stored = record
        .prescription_mut(&incoming.prescription_id)
        .ok_or_else(|| EngineError::prescription_not_found(&incoming.prescription_id))?;
    lifecycle::check_replacement(stored, &incoming)?;

    incoming.created_by = std::mem::take(&mut stored.created_by);
    stamp.apply(&mut incoming);
    *stored = incoming;
    record.touch(stamp.now);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn new_prescription(id: &str, medication: &str, diagnosis: &str) -> Prescription {
        Prescription {
            prescription_id: id.to_string(),
            medication_name: medication.to_string(),
            dosage: "200mg".to_string(),
            diagnosis: diagnosis.to_string(),
            // Callers cannot choose these; merging overwrites them.
            status: PrescriptionStatus::Dispensed,
            created_by: "someone-else".to_string(),
            ..Prescription::default()
        }
    }

    fn incoming(prescriptions: Vec<Prescription>) -> PatientRecord {
        PatientRecord {
            prescriptions,
            ..PatientRecord::new("P1", "Jane Doe", "D1")
        }
    }

    #[test]
    fn test_validate_incoming_requires_ids() {
        let mut record = incoming(vec![]);
        record.doctor_id.clear();
        match validate_incoming(&record) {
            Err(EngineError::Validation { field, .. }) => assert_eq!(field, "DoctorId"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_expiry_clamps_to_month_end() {
        let jan_31 = Utc.with_ymd_and_hms(2026, 1, 31, 10, 0, 0).unwrap();
        assert_eq!(default_expiry(jan_31), NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
        assert_eq!(default_expiry(now()), NaiveDate::from_ymd_opt(2026, 11, 19).unwrap());
    }

    #[test]
    fn test_merge_creates_stamped_record() {
        let ids = SequentialIds::new("rx");
        let stamp = Stamp::new("tx-1", now());
        let record = merge(
            None,
            incoming(vec![new_prescription("RX1", "Ibuprofen", "flu")]),
            &stamp,
            &ids,
        )
        .unwrap();

        let rx = &record.prescriptions[0];
        assert_eq!(rx.status, PrescriptionStatus::Active);
        assert_eq!(rx.created_by, "D1");
        assert_eq!(rx.tx_id, "tx-1");
        assert_eq!(rx.timestamp, now());
        assert_eq!(rx.expiry_date, NaiveDate::from_ymd_opt(2026, 11, 19));
        assert_eq!(record.last_updated, now());
    }

    #[test]
    fn test_merge_keeps_caller_expiry() {
        let ids = SequentialIds::new("rx");
        let mut rx = new_prescription("RX1", "Ibuprofen", "flu");
        rx.expiry_date = NaiveDate::from_ymd_opt(2027, 1, 1);
        let record = merge(None, incoming(vec![rx]), &Stamp::new("tx-1", now()), &ids).unwrap();
        assert_eq!(
            record.prescriptions[0].expiry_date,
            NaiveDate::from_ymd_opt(2027, 1, 1)
        );
    }

    #[test]
    fn test_merge_appends_after_existing() {
        let ids = SequentialIds::new("rx");
        let existing = merge(
            None,
            incoming(vec![new_prescription("RX1", "Ibuprofen", "flu")]),
            &Stamp::new("tx-1", now()),
            &ids,
        )
        .unwrap();

        let later = now() + chrono::Duration::hours(1);
        let mut second = incoming(vec![
            new_prescription("RX2", "Aspirin", "headache"),
            new_prescription("RX3", "Warfarin", "thrombosis"),
        ]);
        second.doctor_id = "D2".to_string();
        second.patient_name = "Renamed".to_string();

        let merged = merge(Some(existing.clone()), second, &Stamp::new("tx-2", later), &ids).unwrap();

        assert_eq!(merged.prescriptions.len(), 3);
        assert_eq!(merged.prescriptions[0], existing.prescriptions[0]);
        assert_eq!(merged.prescriptions[1].prescription_id, "RX2");
        assert_eq!(merged.prescriptions[2].created_by, "D2");
        assert_eq!(merged.patient_name, "Jane Doe");
        assert_eq!(merged.last_updated, later);
    }

    #[test]
    fn test_merge_rejects_missing_diagnosis() {
        let ids = SequentialIds::new("rx");
        let result = merge(
            None,
            incoming(vec![
                new_prescription("RX1", "Ibuprofen", "flu"),
                new_prescription("RX2", "Aspirin", ""),
            ]),
            &Stamp::new("tx-1", now()),
            &ids,
        );
        match result {
            Err(EngineError::Validation { field, .. }) => assert_eq!(field, "Diagnosis"),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_assigns_missing_prescription_ids() {
        let ids = SequentialIds::new("rx");
        let record = merge(
            None,
            incoming(vec![new_prescription("", "Ibuprofen", "flu")]),
            &Stamp::new("tx-1", now()),
            &ids,
        )
        .unwrap();
        assert_eq!(record.prescriptions[0].prescription_id, "rx-1");
    }

    #[test]
    fn test_replace_keeps_creator_and_wipes_omitted_fields() {
        let ids = SequentialIds::new("rx");
        let mut record = merge(
            None,
            incoming(vec![new_prescription("RX1", "Ibuprofen", "flu")]),
            &Stamp::new("tx-1", now()),
            &ids,
        )
        .unwrap();

        let replacement = Prescription {
            prescription_id: "RX1".to_string(),
            medication_name: "Ibuprofen".to_string(),
            dosage: "400mg".to_string(),
            created_by: "impostor".to_string(),
            ..Prescription::default()
        };
        let later = now() + chrono::Duration::minutes(5);
        replace_prescription(&mut record, replacement, &Stamp::new("tx-2", later)).unwrap();

        let rx = &record.prescriptions[0];
        assert_eq!(rx.created_by, "D1");
        assert_eq!(rx.dosage, "400mg");
        assert_eq!(rx.diagnosis, "");
        assert_eq!(rx.expiry_date, None);
        assert_eq!(rx.tx_id, "tx-2");
        assert_eq!(record.last_updated, later);
    }

    #[test]
    fn test_replace_unknown_prescription() {
        let mut record = incoming(vec![]);
        let err = replace_prescription(
            &mut record,
            new_prescription("RX9", "Ibuprofen", "flu"),
            &Stamp::new("tx-2", now()),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "prescription RX9 not found");
    }
}
