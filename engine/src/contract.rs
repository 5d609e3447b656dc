//! The operation surface: one method per ledger transaction or query.
//!
//! Each method runs inside the ledger session it is handed. Mutations read at
//! most one record, apply the rules from [`crate::merger`] and
//! [`crate::lifecycle`], and write the record back. The write may still be
//! rejected by the ledger, so nothing here treats its in-memory result as the
//! committed state.

use std::sync::Arc;

use crate::auth::{AuthorizationGuard, IdentityContext, Role};
use crate::clock::Clock;
use crate::codec;
use crate::error::EngineError;
use crate::ids::IdSource;
use crate::interactions::InteractionTable;
use crate::ledger::LedgerGateway;
use crate::lifecycle::{self, Stamp};
use crate::merger;
use crate::models::{
    AnalyticsReport, DateRange, DispenseRecord, DispenseRequest, DoctorPrescriptionView,
    ExpiryOutcome, HistoryEntry, PatientRecord, Prescription, PrescriptionStatus, RevokeRequest,
};
use crate::projections;

#[derive(Clone)]
pub struct PrescriptionContract {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    guard: AuthorizationGuard,
    interactions: InteractionTable,
}

impl PrescriptionContract {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdSource>) -> Self {
        Self {
            clock,
            ids,
            guard: AuthorizationGuard::default(),
            interactions: InteractionTable::default(),
        }
    }

    pub fn with_guard(mut self, guard: AuthorizationGuard) -> Self {
        self.guard = guard;
        self
    }

    async fn load<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        patient_id: &str,
    ) -> Result<Option<PatientRecord>, EngineError> {
        match ledger.get_state(patient_id).await? {
            Some(bytes) => codec::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn store<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        record: &PatientRecord,
    ) -> Result<(), EngineError> {
        let bytes = codec::encode(record)?;
        ledger.put_state(&record.patient_id, bytes).await?;
        Ok(())
    }

    async fn scan_all<L: LedgerGateway>(
        &self,
        ledger: &mut L,
    ) -> Result<Vec<PatientRecord>, EngineError> {
        let entries = ledger.state_by_range("", "").await?;
        let scanned = entries.len();
        let records = projections::decode_scan(entries);
        tracing::debug!(scanned, decoded = records.len(), "full ledger scan");
        Ok(records)
    }

    /// Creates the patient's record, or appends the incoming prescriptions to
    /// the existing one. Resubmitting a payload appends its prescriptions
    /// again.
    pub async fn create_or_merge_asset<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        incoming: PatientRecord,
    ) -> Result<(), EngineError> {
        merger::validate_incoming(&incoming)?;

        let existing = self.load(ledger, &incoming.patient_id).await?;
        let created = existing.is_none();
        let added = incoming.prescriptions.len();

        let tx_id = ledger.tx_id().to_string();
        let stamp = Stamp::new(&tx_id, self.clock.now());
        let record = merger::merge(existing, incoming, &stamp, self.ids.as_ref())?;
        self.store(ledger, &record).await?;

        tracing::info!(
            patient_id = %record.patient_id,
            tx_id = %tx_id,
            created,
            added,
            total = record.prescriptions.len(),
            "patient record written"
        );
        Ok(())
    }

    pub async fn read_asset<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        patient_id: &str,
    ) -> Result<PatientRecord, EngineError> {
        self.load(ledger, patient_id)
            .await?
            .ok_or_else(|| EngineError::record_not_found(patient_id))
    }

    /// Replaces a stored prescription with `prescription`; only `CreatedBy`
    /// survives from the stored copy.
    pub async fn update_prescription<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        patient_id: &str,
        prescription: Prescription,
    ) -> Result<(), EngineError> {
        let mut record = self.read_asset(ledger, patient_id).await?;
        let prescription_id = prescription.prescription_id.clone();

        let tx_id = ledger.tx_id().to_string();
        let stamp = Stamp::new(&tx_id, self.clock.now());
        merger::replace_prescription(&mut record, prescription, &stamp)?;
        self.store(ledger, &record).await?;

        tracing::info!(%patient_id, %prescription_id, %tx_id, "prescription updated");
        Ok(())
    }

    pub async fn dispense_prescription<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        request: DispenseRequest,
    ) -> Result<(), EngineError> {
        request.validate()?;
        let mut record = self.read_asset(ledger, &request.patient_id).await?;

        let tx_id = ledger.tx_id().to_string();
        let stamp = Stamp::new(&tx_id, self.clock.now());
        let prescription = record
            .prescription_mut(&request.prescription_id)
            .ok_or_else(|| EngineError::prescription_not_found(&request.prescription_id))?;
        lifecycle::dispense(prescription, &request.pharmacist_id, &stamp)?;
        record.touch(stamp.now);
        self.store(ledger, &record).await?;

        tracing::info!(
            patient_id = %request.patient_id,
            prescription_id = %request.prescription_id,
            pharmacist_id = %request.pharmacist_id,
            %tx_id,
            "prescription dispensed"
        );
        Ok(())
    }

    /// Only the doctor recorded as `CreatedBy` may revoke. The caller's role is
    /// not consulted.
    pub async fn revoke_prescription<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        request: RevokeRequest,
    ) -> Result<(), EngineError> {
        request.validate()?;
        let mut record = self.read_asset(ledger, &request.patient_id).await?;

        let tx_id = ledger.tx_id().to_string();
        let stamp = Stamp::new(&tx_id, self.clock.now());
        let prescription = record
            .prescription_mut(&request.prescription_id)
            .ok_or_else(|| EngineError::prescription_not_found(&request.prescription_id))?;
        lifecycle::revoke(prescription, &request.doctor_id, &stamp)?;
        record.touch(stamp.now);
        self.store(ledger, &record).await?;

        tracing::info!(
            patient_id = %request.patient_id,
            prescription_id = %request.prescription_id,
            doctor_id = %request.doctor_id,
            %tx_id,
            "prescription revoked"
        );
        Ok(())
    }

    /// One entry per committed version of the patient's record.
    pub async fn get_asset_history<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        patient_id: &str,
    ) -> Result<Vec<HistoryEntry>, EngineError> {
        let history = ledger.history_for_key(patient_id).await?;
        tracing::debug!(%patient_id, versions = history.len(), "history read");
        history.iter().map(projections::history_entry).collect()
    }

    pub async fn get_prescriptions_by_status<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        patient_id: &str,
        status: PrescriptionStatus,
    ) -> Result<Vec<Prescription>, EngineError> {
        let record = self.read_asset(ledger, patient_id).await?;
        Ok(projections::by_status(&record, status))
    }

    /// The patient's record narrowed to prescriptions written by the calling
    /// doctor.
    pub async fn get_prescriptions_by_patient_for_doctor<L, I>(
        &self,
        ledger: &mut L,
        identity: &I,
        patient_id: &str,
    ) -> Result<PatientRecord, EngineError>
    where
        L: LedgerGateway,
        I: IdentityContext + Sync,
    {
        let role = self.guard.resolve_caller(identity)?;
        if role != Role::Doctor {
            return Err(EngineError::Authorization(
                "only doctors can access patient prescriptions".to_string(),
            ));
        }

        let record = self.read_asset(ledger, patient_id).await?;
        Ok(projections::for_prescriber(record, identity.caller_id()))
    }

    pub async fn check_prescription_expiry<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        patient_id: &str,
        prescription_id: &str,
    ) -> Result<ExpiryOutcome, EngineError> {
        let mut record = self.read_asset(ledger, patient_id).await?;

        let tx_id = ledger.tx_id().to_string();
        let stamp = Stamp::new(&tx_id, self.clock.now());
        let prescription = record
            .prescription_mut(prescription_id)
            .ok_or_else(|| EngineError::prescription_not_found(prescription_id))?;
        let outcome = lifecycle::expire(prescription, &stamp)?;

        if outcome == ExpiryOutcome::Expired {
            record.touch(stamp.now);
            self.store(ledger, &record).await?;
            tracing::info!(%patient_id, %prescription_id, %tx_id, "prescription expired");
        } else {
            tracing::debug!(%patient_id, %prescription_id, ?outcome, "expiry check");
        }
        Ok(outcome)
    }

    /// Counters over every record in the ledger. `range` is accepted but not
    /// applied.
    pub async fn get_prescription_analytics<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        range: &DateRange,
    ) -> Result<AnalyticsReport, EngineError> {
        tracing::debug!(
            start_date = ?range.start_date,
            end_date = ?range.end_date,
            "analytics requested"
        );
        let records = self.scan_all(ledger).await?;
        Ok(projections::analytics(&records))
    }

    pub async fn check_medication_interactions<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        patient_id: &str,
        medication: &str,
    ) -> Result<Vec<String>, EngineError> {
        let record = self.read_asset(ledger, patient_id).await?;
        Ok(self.interactions.check(&record, medication))
    }

    /// Applies [`Self::create_or_merge_asset`] to each record in order. The
    /// first failure stops the batch; records before it stay written.
    pub async fn batch_create_prescriptions<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        records: Vec<PatientRecord>,
    ) -> Result<(), EngineError> {
        let total = records.len();
        for (index, record) in records.into_iter().enumerate() {
            if let Err(err) = self.create_or_merge_asset(ledger, record).await {
                tracing::warn!(index, total, error = %err, "batch stopped");
                return Err(err);
            }
        }
        Ok(())
    }

    pub async fn get_prescriptions_by_doctor<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        doctor_id: &str,
    ) -> Result<Vec<DoctorPrescriptionView>, EngineError> {
        let now = self.clock.now();
        let views: Vec<_> = self
            .scan_all(ledger)
            .await?
            .iter()
            .flat_map(|record| projections::doctor_views(record, doctor_id, now))
            .collect();

        if views.is_empty() {
            return Err(EngineError::NotFound {
                resource: "prescriptions for doctor",
                id: doctor_id.to_string(),
            });
        }
        Ok(views)
    }

    pub async fn get_dispense_history<L: LedgerGateway>(
        &self,
        ledger: &mut L,
        pharmacist_id: &str,
    ) -> Result<Vec<DispenseRecord>, EngineError> {
        Ok(self
            .scan_all(ledger)
            .await?
            .iter()
            .flat_map(|record| projections::dispense_records(record, pharmacist_id))
            .collect())
    }
}
