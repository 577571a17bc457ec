use std::collections::HashSet;

use chrono::NaiveDate;

use crate::config::EngineConfig;
use crate::models::{Charge, Note, Patient, RawEncounter, Visit};

/// The tracked residents, in reporting order, with constant-time membership.
#[derive(Debug, Clone)]
pub struct ResidentRoster {
    names: Vec<String>,
    members: HashSet<String>,
}

/// Which resident a note is credited to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub resident: String,
    /// Signing and initial author are both tracked residents and differ.
    pub ambiguous: bool,
}

impl ResidentRoster {
    pub fn new(names: Vec<String>) -> Self {
        let members = names.iter().cloned().collect();
        Self { names, members }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.all_residents())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: Option<&str>) -> bool {
        name.is_some_and(|name| self.members.contains(name))
    }

    /// Credits the signing author when tracked, otherwise the initial author.
    pub fn attribute(&self, note: &Note) -> Option<Attribution> {
        let signing = note.signing_author.as_deref().filter(|n| self.members.contains(*n));
        let initial = note.initial_author.as_deref().filter(|n| self.members.contains(*n));
        match (signing, initial) {
            (Some(signer), Some(first)) => Some(Attribution {
                resident: signer.to_string(),
                ambiguous: signer != first,
            }),
            (Some(signer), None) => Some(Attribution {
                resident: signer.to_string(),
                ambiguous: false,
            }),
            (None, Some(first)) => Some(Attribution {
                resident: first.to_string(),
                ambiguous: false,
            }),
            (None, None) => None,
        }
    }
}

pub fn is_completed(encounter: &RawEncounter, config: &EngineConfig) -> bool {
    encounter.appt_status == config.completed_status
}

pub fn is_resident_visit(visit: &Visit, roster: &ResidentRoster) -> bool {
    roster.contains(visit.service_provider.as_deref())
}

/// Notes that count toward inpatient/ED experience: authored by a tracked
/// resident, outside the birth-location departments, of a clinical note type.
pub fn is_countable_note(note: &Note, roster: &ResidentRoster, config: &EngineConfig) -> bool {
    let authored = roster.contains(note.signing_author.as_deref())
        || roster.contains(note.initial_author.as_deref());
    authored
        && !config.excluded_note_departments.contains(&note.dept)
        && config.note_types.contains(&note.note_type)
}

/// Facility-billed lines and zero-RVU lines never count toward productivity.
pub fn is_countable_charge(charge: &Charge, since: NaiveDate) -> bool {
    let facility = charge
        .modifiers
        .as_deref()
        .is_some_and(|modifiers| modifiers.contains("FAC"));
    let zero_rvu = charge.wrvu == Some(0.0);
    !facility && !zero_rvu && charge.date >= since
}

pub fn within_window(date: NaiveDate, since: NaiveDate) -> bool {
    date >= since
}

/// Keeps only patients with at least one of the given visits, preserving order.
pub fn patients_with_visits(patients: Vec<Patient>, visits: &[Visit]) -> Vec<Patient> {
    let seen: HashSet<&str> = visits.iter().map(|v| v.patient_id.as_str()).collect();
    patients
        .into_iter()
        .filter(|p| seen.contains(p.patient_id.as_str()))
        .collect()
}
