use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{EngineError, Result};

/// Residents grouped by training year, e.g. "R3".
#[derive(Debug, Clone, Deserialize)]
pub struct ResidentClass {
    pub name: String,
    pub residents: Vec<String>,
}

/// Maps a billing provider's full warehouse name to the short name shown on dashboards.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderAlias {
    pub name: String,
    pub alias: String,
}

/// Fixed lookup tables and policy knobs for one engine run.
///
/// Built once at startup (defaults or a TOML override) and only ever borrowed
/// immutably by the pipeline stages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub resident_classes: Vec<ResidentClass>,
    pub provider_aliases: Vec<ProviderAlias>,
    pub clinic_ids: BTreeMap<String, String>,
    pub office_visit_types: Vec<String>,
    pub ob_icd_codes: Vec<String>,
    pub ob_level_of_service: Vec<String>,
    pub note_types: Vec<String>,
    pub excluded_note_departments: Vec<String>,
    pub inpatient_locations: Vec<String>,
    pub telehealth_type: String,
    pub completed_status: String,
    pub volume_window_days: i64,
    pub charge_lookback_years: i32,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        let resident_classes = vec![
            ResidentClass {
                name: "R3".to_string(),
                residents: strings(&["CARVER, ELLIS", "HOLLAND, PRIYA", "OKAFOR, SAMUEL"]),
            },
            ResidentClass {
                name: "R2".to_string(),
                residents: strings(&["BRENNAN, TESSA", "LINDQVIST, NORA", "MATSUDA, KEN"]),
            },
            ResidentClass {
                name: "R1".to_string(),
                residents: strings(&["ALVAREZ, MARCO", "DUBOIS, CLAIRE", "WHITFIELD, OWEN"]),
            },
        ];

        let provider_aliases = [
            ("ASHFORD, DANIEL", "Ashford"),
            ("BELLAMY, GRACE", "Grace"),
            ("CORTEZ, MIGUEL", "Cortez"),
            ("DRAPER, HANNAH", "Hannah"),
        ]
        .into_iter()
        .map(|(name, alias)| ProviderAlias {
            name: name.to_string(),
            alias: alias.to_string(),
        })
        .collect();

        let clinic_ids = [
            ("CC WPL PULLMAN FAMILY MEDICINE", "Pullman Family Medicine"),
            (
                "CC WPL PALOUSE HEALTH CTR PRIM CARE",
                "Pullman Family Medicine (Palouse Health Center)",
            ),
            ("CC WPL FM RESIDENCY CLINIC", "Residency"),
            ("CC WPL PALOUSE PEDIATRICS PULLMAN", "Palouse Pediatrics Pullman"),
            ("CC WPL PALOUSE PEDIATRICS MOSCOW", "Palouse Pediatrics Moscow"),
            ("CC WPL PALOUSE MED PRIMARY CARE", "Palouse Medical"),
        ]
        .into_iter()
        .map(|(dept, clinic)| (dept.to_string(), clinic.to_string()))
        .collect();

        Self {
            resident_classes,
            provider_aliases,
            clinic_ids,
            office_visit_types: strings(&[
                "CC OFFICE VISIT",
                "CC FOLLOW UP",
                "CVV VIRTUAL VISIT",
                "CC PROCEDURE",
                "CC OFFICE VISIT (LONG)",
                "CC WELL BABY",
                "CC WELL CHILD",
                "CC OB FOLLOW UP",
                "CVV VIRTUAL VISIT EXTENDED",
                "CC DIABETIC MANAGEMENT",
                "CC NEW PATIENT",
                "CC TELEPHONE VISIT",
                "CC MEDICARE ANNUAL WELLNESS",
                "CC WELLNESS",
                "CC PHYSICAL",
                "CC VASECTOMY",
                "CC POST PARTUM",
                "CC DOT PHYSICAL",
                "CC CIRCUMCISION",
                "CC WELL WOMEN",
                "CC SPORTS PHYSICAL",
                "CC MEDICARE SUB AN WELL",
                "CC PRENATAL",
                "CC SAME DAY",
                "CC OFFSITE CARE",
                "CC MEDICARE WELCOME",
                "CC FAA PHYSICAL",
            ]),
            ob_icd_codes: strings(&["Z32.01", "Z33", "Z34", "Z3A", "O09"]),
            ob_level_of_service: strings(&["0500F", "0501F", "0502F", "0503F", "09888"]),
            note_types: strings(&[
                "ED Provider Notes",
                "ED Notes",
                "ED Observation Notes",
                "H&P",
                "Interval H&P Note",
                "Progress Notes",
                "Assessment & Plan Note",
                "Hospital Course",
                "Interim Summary - Physician",
                "Discharge Summary",
                "Consults",
                "Procedures",
                "L&D Delivery Note",
                "SNF Transfer",
                "Significant Event",
            ]),
            excluded_note_departments: strings(&["CC WPL NURSERY", "CC WPL LABOR AND DELIVERY"]),
            inpatient_locations: strings(&["CC WPL PULLMAN REGIONAL HOSPITAL"]),
            telehealth_type: "CVV VIRTUAL VISIT".to_string(),
            completed_status: "Completed".to_string(),
            volume_window_days: 1095,
            charge_lookback_years: 2,
        }
    }
}

impl EngineConfig {
    /// Reads a TOML override. Missing keys keep their built-in defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&text).map_err(|err| EngineError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.volume_window_days <= 0 {
            return Err(EngineError::Config(
                "volume_window_days must be positive".to_string(),
            ));
        }
        if self.charge_lookback_years < 0 {
            return Err(EngineError::Config(
                "charge_lookback_years must not be negative".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for resident in self.all_residents() {
            if !seen.insert(resident.clone()) {
                return Err(EngineError::Config(format!(
                    "resident {resident} is listed in more than one class"
                )));
            }
        }
        Ok(())
    }

    /// Tracked residents, senior classes first, alphabetical within a class.
    pub fn all_residents(&self) -> Vec<String> {
        self.resident_classes
            .iter()
            .flat_map(|class| {
                let mut names = class.residents.clone();
                names.sort();
                names
            })
            .collect()
    }

    pub fn residents_by_class(&self) -> BTreeMap<String, Vec<String>> {
        self.resident_classes
            .iter()
            .map(|class| (class.name.clone(), class.residents.clone()))
            .collect()
    }

    pub fn provider_alias(&self, name: &str) -> Option<&str> {
        self.provider_aliases
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.alias.as_str())
    }

    /// Full warehouse names of every aliased billing provider.
    pub fn provider_names(&self) -> Vec<String> {
        self.provider_aliases
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn provider_alias_names(&self) -> Vec<String> {
        self.provider_aliases
            .iter()
            .map(|entry| entry.alias.clone())
            .collect()
    }
}
