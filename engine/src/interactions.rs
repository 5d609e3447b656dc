use std::collections::HashMap;

use crate::models::PatientRecord;

/// Static medication → interacting-medications lookup.
///
/// Symmetry is the table author's job: `A → B` does not imply `B → A`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionTable {
    entries: HashMap<String, Vec<String>>,
}

impl InteractionTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with_entry<I, S>(mut self, medication: impl Into<String>, interacts_with: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries.insert(
            medication.into(),
            interacts_with.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn interactions_of(&self, medication: &str) -> &[String] {
        self.entries
            .get(medication)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// One warning per active prescription in `record` that interacts with
    /// `candidate`.
    pub fn check(&self, record: &PatientRecord, candidate: &str) -> Vec<String> {
        let interacting = self.interactions_of(candidate);
        if interacting.is_empty() {
            return Vec::new();
        }

        record
            .active_prescriptions()
            .filter(|p| interacting.contains(&p.medication_name))
            .map(|p| {
                format!(
                    "Warning: {} interacts with active medication {} (prescribed for {})",
                    candidate, p.medication_name, p.diagnosis
                )
            })
            .collect()
    }
}

impl Default for InteractionTable {
    fn default() -> Self {
        Self::empty()
            .with_entry("Aspirin", ["Warfarin", "Heparin", "Ibuprofen"])
            .with_entry("Ibuprofen", ["Aspirin", "Warfarin"])
            .with_entry("Warfarin", ["Aspirin", "Ibuprofen"])
            .with_entry("Heparin", ["Aspirin"])
    }
}
