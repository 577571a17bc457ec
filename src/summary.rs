use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::models::Patient;

/// Lookup lists for dashboard filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SummaryIndex {
    /// Distinct panel locations in first-seen order.
    pub clinics: Vec<String>,
    /// Distinct panel providers per panel location in first-seen order.
    pub providers: BTreeMap<String, Vec<String>>,
}

impl SummaryIndex {
    pub fn build(patients: &[Patient]) -> Self {
        let mut clinics: Vec<String> = Vec::new();
        let mut providers: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for patient in patients {
            let Some(clinic) = patient.panel_location.as_ref() else {
                continue;
            };
            let clinic_providers = providers.entry(clinic.clone()).or_insert_with(|| {
                clinics.push(clinic.clone());
                Vec::new()
            });
            if let Some(provider) = patient.panel_provider.as_ref() {
                if !clinic_providers.contains(provider) {
                    clinic_providers.push(provider.clone());
                }
            }
        }

        Self { clinics, providers }
    }

    /// Every provider across all clinics, merging names that differ only in case.
    /// Clinics are walked in first-seen order, so the earliest spelling wins.
    pub fn all_providers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.clinics
            .iter()
            .flat_map(|clinic| self.providers_for(clinic))
            .filter(|provider| seen.insert(provider.to_lowercase()))
            .cloned()
            .collect()
    }

    pub fn providers_for(&self, clinic: &str) -> &[String] {
        self.providers.get(clinic).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(id: &str, clinic: Option<&str>, provider: Option<&str>) -> Patient {
        Patient {
            patient_id: id.to_string(),
            sex: "O".to_string(),
            age: Some(50),
            age_in_mo_under_3: None,
            age_display: Some("50".to_string()),
            location: None,
            pcp: None,
            panel_location: clinic.map(str::to_string),
            panel_provider: provider.map(str::to_string),
            panel_assignment_rule: None,
        }
    }

    #[test]
    fn index_skips_missing_values_and_keeps_first_seen_order() {
        let patients = vec![
            patient("p1", Some("Residency"), Some("CARVER, ELLIS")),
            patient("p2", None, Some("ORPHAN, DOC")),
            patient("p3", Some("Palouse Medical"), None),
            patient("p4", Some("Residency"), Some("HOLLAND, PRIYA")),
            patient("p5", Some("Residency"), Some("CARVER, ELLIS")),
            patient("p6", Some("Palouse Medical"), Some("Carver, Ellis")),
        ];

        let index = SummaryIndex::build(&patients);
        assert_eq!(index.clinics, vec!["Residency", "Palouse Medical"]);
        assert_eq!(
            index.providers_for("Residency"),
            &["CARVER, ELLIS".to_string(), "HOLLAND, PRIYA".to_string()]
        );
        assert_eq!(index.providers_for("Palouse Medical"), &["Carver, Ellis".to_string()]);
        assert!(index.providers_for("Unassigned").is_empty());

        assert_eq!(index.all_providers(), vec!["CARVER, ELLIS", "HOLLAND, PRIYA"]);
    }

    #[test]
    fn all_providers_keeps_the_spelling_from_the_first_seen_clinic() {
        let patients = vec![
            patient("p1", Some("Zeta"), Some("SMITH, A")),
            patient("p2", Some("Alpha"), Some("Smith, A")),
            patient("p3", Some("Alpha"), Some("JONES, B")),
        ];

        let index = SummaryIndex::build(&patients);
        assert_eq!(index.clinics, vec!["Zeta", "Alpha"]);
        assert_eq!(index.all_providers(), vec!["SMITH, A", "JONES, B"]);
    }
}
