use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Lifecycle status of a single prescription.
///
/// `Active` is the only state with outgoing transitions; the other three are
/// terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrescriptionStatus {
    #[default]
    Active,
    Dispensed,
    Revoked,
    Expired,
}

impl PrescriptionStatus {
    pub const ALL: [PrescriptionStatus; 4] = [
        PrescriptionStatus::Active,
        PrescriptionStatus::Dispensed,
        PrescriptionStatus::Revoked,
        PrescriptionStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Active => "Active",
            PrescriptionStatus::Dispensed => "Dispensed",
            PrescriptionStatus::Revoked => "Revoked",
            PrescriptionStatus::Expired => "Expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PrescriptionStatus::Active)
    }

    /// True when `next` is reachable from `self` by exactly one lifecycle edge.
    pub fn can_transition_to(&self, next: PrescriptionStatus) -> bool {
        matches!(self, PrescriptionStatus::Active) && next != PrescriptionStatus::Active
    }
}

impl fmt::Display for PrescriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrescriptionStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrescriptionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                EngineError::validation(
                    "status",
                    format!("unknown prescription status '{}'", s),
                )
            })
    }
}

/// A prescription embedded in exactly one patient record.
///
/// Missing fields decode to their zero value, so a payload that omits a field
/// wipes it when used as a full replacement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Prescription {
    pub prescription_id: String,
    pub medication_name: String,
    pub dosage: String,
    pub instructions: String,
    pub diagnosis: String,
    pub status: PrescriptionStatus,
    pub created_by: String,
    #[serde(rename = "TxID")]
    pub tx_id: String,
    #[serde(deserialize_with = "blank::or_default")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "blank::option")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(rename = "dispensingPharmacist", skip_serializing_if = "Option::is_none")]
    pub dispensing_pharmacist: Option<String>,
    #[serde(
        rename = "dispensingTimestamp",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "blank::option"
    )]
    pub dispensing_timestamp: Option<DateTime<Utc>>,
}

/// A patient's prescription record, stored as one ledger value keyed by
/// `patient_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PatientRecord {
    pub doctor_id: String,
    pub patient_name: String,
    pub patient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(deserialize_with = "blank::nullable")]
    pub prescriptions: Vec<Prescription>,
    #[serde(deserialize_with = "blank::or_default")]
    pub last_updated: DateTime<Utc>,
}

impl PatientRecord {
    pub fn new(
        patient_id: impl Into<String>,
        patient_name: impl Into<String>,
        doctor_id: impl Into<String>,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            patient_name: patient_name.into(),
            doctor_id: doctor_id.into(),
            ..Self::default()
        }
    }

    /// First prescription carrying `prescription_id`. Later duplicates are
    /// shadowed.
    pub fn prescription(&self, prescription_id: &str) -> Option<&Prescription> {
        self.prescriptions
            .iter()
            .find(|p| p.prescription_id == prescription_id)
    }

    pub fn prescription_mut(&mut self, prescription_id: &str) -> Option<&mut Prescription> {
        self.prescriptions
            .iter_mut()
            .find(|p| p.prescription_id == prescription_id)
    }

    pub fn active_prescriptions(&self) -> impl Iterator<Item = &Prescription> {
        self.prescriptions
            .iter()
            .filter(|p| p.status == PrescriptionStatus::Active)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_updated = now;
    }
}

/// Lenient decoding for typed values written by older clients, which store
/// unset dates and timestamps as `""` or `null`. Text fields are not touched.
mod blank {
    use serde::de::{self, Deserialize, Deserializer};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref() {
            None | Some("") => Ok(None),
            Some(value) => value.parse().map(Some).map_err(de::Error::custom),
        }
    }

    pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr + Default,
        T::Err: Display,
    {
        Ok(option(deserializer)?.unwrap_or_default())
    }

    pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Default,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }
}
