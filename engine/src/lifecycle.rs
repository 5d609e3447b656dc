//! Status transitions of a single prescription.
//!
//! ```text
//! Active ──dispense──▶ Dispensed
//!   │ ────revoke────▶ Revoked
//!   └─────expire────▶ Expired
//! ```
//!
//! Every transition refreshes the prescription's `tx_id` and `timestamp`.
//! Refreshing the owning record's `last_updated` is the caller's job.

use chrono::{DateTime, Utc};

use crate::error::{Conflict, EngineError};
use crate::models::{ExpiryOutcome, Prescription, PrescriptionStatus};

/// Transaction id and time written onto everything a mutation touches.
#[derive(Debug, Clone, Copy)]
pub struct Stamp<'a> {
    pub tx_id: &'a str,
    pub now: DateTime<Utc>,
}

impl<'a> Stamp<'a> {
    pub fn new(tx_id: &'a str, now: DateTime<Utc>) -> Self {
        Self { tx_id, now }
    }

    pub fn apply(&self, prescription: &mut Prescription) {
        prescription.tx_id = self.tx_id.to_string();
        prescription.timestamp = self.now;
    }
}

pub fn dispense(
    prescription: &mut Prescription,
    pharmacist_id: &str,
    stamp: &Stamp<'_>,
) -> Result<(), EngineError> {
    match prescription.status {
        PrescriptionStatus::Active => {}
        PrescriptionStatus::Revoked => {
            return Err(EngineError::conflict(
                &prescription.prescription_id,
                Conflict::DispenseRevoked,
            ))
        }
        other => {
            return Err(EngineError::conflict(
                &prescription.prescription_id,
                Conflict::DispenseNotActive(other),
            ))
        }
    }

    prescription.status = PrescriptionStatus::Dispensed;
    prescription.dispensing_pharmacist = Some(pharmacist_id.to_string());
    prescription.dispensing_timestamp = Some(stamp.now);
    stamp.apply(prescription);
    Ok(())
}

/// Only the original prescriber may revoke, whatever the current status.
pub fn revoke(
    prescription: &mut Prescription,
    doctor_id: &str,
    stamp: &Stamp<'_>,
) -> Result<(), EngineError> {
    if prescription.created_by != doctor_id {
        return Err(EngineError::Authorization(format!(
            "only the prescribing doctor can revoke prescription {}",
            prescription.prescription_id
        )));
    }
    if prescription.status != PrescriptionStatus::Active {
        return Err(EngineError::conflict(
            &prescription.prescription_id,
            Conflict::RevokeNotActive(prescription.status),
        ));
    }

    prescription.status = PrescriptionStatus::Revoked;
    stamp.apply(prescription);
    Ok(())
}

/// Expires an active prescription once the stamp's calendar date is strictly
/// after its expiry date.
pub fn expire(
    prescription: &mut Prescription,
    stamp: &Stamp<'_>,
) -> Result<ExpiryOutcome, EngineError> {
    let expiry_date = prescription.expiry_date.ok_or_else(|| {
        EngineError::validation(
            "ExpiryDate",
            format!(
                "prescription {} has no expiry date",
                prescription.prescription_id
            ),
        )
    })?;

    if stamp.now.date_naive() <= expiry_date {
        return Ok(ExpiryOutcome::NotYetDue);
    }
    if prescription.status.is_terminal() {
        return Ok(ExpiryOutcome::AlreadyTerminal(prescription.status));
    }

    prescription.status = PrescriptionStatus::Expired;
    stamp.apply(prescription);
    Ok(ExpiryOutcome::Expired)
}

/// A full-replacement update may keep the status or move it forward, never
/// back.
pub fn check_replacement(stored: &Prescription, incoming: &Prescription) -> Result<(), EngineError> {
    if incoming.status == stored.status || stored.status.can_transition_to(incoming.status) {
        return Ok(());
    }
    Err(EngineError::conflict(
        &stored.prescription_id,
        Conflict::ReopenViaUpdate {
            from: stored.status,
            to: incoming.status,
        },
    ))
}
