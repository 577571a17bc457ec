use std::collections::HashMap;

use chrono::NaiveDate;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{
    Charge, Note, NoteSource, Patient, RawCharge, RawEncounter, RawNote, RawPanelAssignment,
    RawPatient, Visit,
};

/// Parses a warehouse `YYYYMMDD` date. Anything else is fatal.
pub fn parse_compact_date(
    table: &'static str,
    column: &'static str,
    value: &str,
) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d").map_err(|_| EngineError::InvalidDate {
        table,
        column,
        value: value.to_string(),
    })
}

/// Parses an ISO `YYYY-MM-DD` date, ignoring a trailing time component.
pub fn parse_iso_date(table: &'static str, column: &'static str, value: &str) -> Result<NaiveDate> {
    let day = value
        .trim()
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or_default();
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| EngineError::InvalidDate {
        table,
        column,
        value: value.to_string(),
    })
}

pub fn age_display(age: Option<i32>, age_in_months: Option<i32>) -> Option<String> {
    let age = age?;
    match age_in_months {
        Some(months) if age < 2 => Some(format!("{months} mo")),
        _ => Some(age.to_string()),
    }
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub fn home_location(city: Option<&str>, state: Option<&str>) -> Option<String> {
    match (city, state) {
        (Some(city), Some(state)) => {
            Some(format!("{}, {}", title_case(city), state.to_uppercase()))
        }
        _ => None,
    }
}

/// Builds canonical patients, joining panel location/provider by patient id.
pub fn patients(raw: Vec<RawPatient>, panels: &[RawPanelAssignment]) -> Vec<Patient> {
    let mut panel_by_patient: HashMap<&str, &RawPanelAssignment> = HashMap::new();
    for panel in panels {
        panel_by_patient.entry(panel.patient_id.as_str()).or_insert(panel);
    }

    raw.into_iter()
        .map(|row| {
            let panel = panel_by_patient.get(row.patient_id.as_str());
            Patient {
                age_display: age_display(row.age, row.age_in_mo_under_3),
                location: home_location(row.city.as_deref(), row.state.as_deref()),
                panel_location: panel.and_then(|p| p.panel_location.clone()),
                panel_provider: panel.and_then(|p| p.panel_provider.clone()),
                patient_id: row.patient_id,
                sex: row.sex,
                age: row.age,
                age_in_mo_under_3: row.age_in_mo_under_3,
                pcp: row.pcp,
                panel_assignment_rule: row.panel_assignment_rule,
            }
        })
        .collect()
}

pub fn visit(raw: RawEncounter, config: &EngineConfig) -> Result<Visit> {
    let date = parse_compact_date("encounters", "encounter_date", &raw.encounter_date)?;
    Ok(Visit {
        location: config.clinic_ids.get(&raw.dept).cloned(),
        patient_id: raw.patient_id,
        date,
        age: raw.encounter_age,
        age_in_mo_under_3: raw.encounter_age_in_mo_under_3,
        encounter_type: raw.encounter_type,
        service_provider: raw.service_provider,
        with_pcp: raw.with_pcp.unwrap_or(false),
        diagnoses: raw.diagnoses,
        diagnoses_icd: raw.diagnoses_icd,
        level_of_service: raw.level_of_service,
    })
}

pub fn note(raw: RawNote, source: NoteSource) -> Result<Note> {
    let table = match source {
        NoteSource::Inpatient => "notes_inpt",
        NoteSource::Ed => "notes_ed",
    };
    let service_date = parse_iso_date(table, "service_date", &raw.service_date)?;
    Ok(Note {
        patient_id: raw.patient_id,
        service_date,
        dept: raw.dept,
        note_type: raw.note_type,
        signing_author: raw.signing_author,
        initial_author: raw.initial_author,
        cosign_author: raw.cosign_author,
        age: raw.encounter_age,
        source,
    })
}

/// Normalizes a charge. Providers missing from the alias table yield `None`.
pub fn charge(raw: RawCharge, config: &EngineConfig) -> Result<Option<Charge>> {
    let date = parse_iso_date("charges", "service_date", &raw.service_date)?;
    let posted_date = parse_iso_date("charges", "post_date", &raw.post_date)?;
    let Some(provider) = config.provider_alias(&raw.billing_provider) else {
        tracing::debug!(provider = %raw.billing_provider, "dropping charge for unmapped provider");
        return Ok(None);
    };

    Ok(Some(Charge {
        patient_id: raw.patient_id,
        date,
        posted_date,
        provider: provider.to_string(),
        cpt: raw.procedure_code,
        modifiers: raw.modifiers,
        cpt_desc: raw.procedure_desc,
        quantity: raw.quantity,
        wrvu: raw.wrvu,
        reversal_reason: raw.reversal_reason,
        insurance_class: raw.insurance_class,
        location: raw.location,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_patient(id: &str, age: Option<i32>, months: Option<i32>) -> RawPatient {
        RawPatient {
            patient_id: id.to_string(),
            sex: "F".to_string(),
            age,
            age_in_mo_under_3: months,
            city: Some("coeur d'alene".to_string()),
            state: Some("id".to_string()),
            pcp: None,
            panel_assignment_rule: None,
        }
    }

    fn raw_charge(provider: &str) -> RawCharge {
        RawCharge {
            patient_id: "p1".to_string(),
            service_date: "2024-02-03".to_string(),
            post_date: "2024-02-10 00:00:00".to_string(),
            billing_provider: provider.to_string(),
            procedure_code: Some("99213".to_string()),
            modifiers: None,
            procedure_desc: None,
            quantity: Some(1),
            wrvu: Some(1.3),
            reversal_reason: None,
            insurance_class: Some("Medicaid".to_string()),
            location: None,
        }
    }

    #[test]
    fn infants_display_age_in_months() {
        assert_eq!(age_display(Some(1), Some(14)).as_deref(), Some("14 mo"));
        assert_eq!(age_display(Some(0), Some(3)).as_deref(), Some("3 mo"));
        assert_eq!(age_display(Some(2), Some(26)).as_deref(), Some("2"));
        assert_eq!(age_display(Some(40), None).as_deref(), Some("40"));
        assert_eq!(age_display(Some(1), None).as_deref(), Some("1"));
        assert_eq!(age_display(None, Some(5)), None);
    }

    #[test]
    fn location_is_title_cased_city_and_upper_state() {
        assert_eq!(
            home_location(Some("PULLMAN"), Some("wa")).as_deref(),
            Some("Pullman, WA")
        );
        assert_eq!(
            home_location(Some("coeur d'alene"), Some("id")).as_deref(),
            Some("Coeur D'Alene, ID")
        );
        assert_eq!(home_location(None, Some("WA")), None);
    }

    #[test]
    fn patients_pick_up_panel_assignment() {
        let panels = vec![
            RawPanelAssignment {
                patient_id: "p1".to_string(),
                panel_location: Some("Residency".to_string()),
                panel_provider: Some("CARVER, ELLIS".to_string()),
            },
            RawPanelAssignment {
                patient_id: "p1".to_string(),
                panel_location: Some("Elsewhere".to_string()),
                panel_provider: None,
            },
        ];
        let out = patients(
            vec![raw_patient("p1", Some(1), Some(20)), raw_patient("p2", Some(30), None)],
            &panels,
        );

        assert_eq!(out[0].panel_location.as_deref(), Some("Residency"));
        assert_eq!(out[0].age_display.as_deref(), Some("20 mo"));
        assert_eq!(out[0].location.as_deref(), Some("Coeur D'Alene, ID"));
        assert_eq!(out[1].panel_location, None);
        assert_eq!(out[1].panel_provider, None);
    }

    #[test]
    fn bad_encounter_date_is_fatal() {
        let err = parse_compact_date("encounters", "encounter_date", "2024-01-05").unwrap_err();
        assert!(matches!(err, EngineError::InvalidDate { table: "encounters", .. }));
        assert!(parse_compact_date("encounters", "encounter_date", "20240105").is_ok());
    }

    #[test]
    fn iso_dates_ignore_time_component() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        assert_eq!(parse_iso_date("t", "c", "2024-02-10").unwrap(), expected);
        assert_eq!(parse_iso_date("t", "c", "2024-02-10 08:30:00").unwrap(), expected);
        assert_eq!(parse_iso_date("t", "c", "2024-02-10T08:30:00").unwrap(), expected);
        assert!(parse_iso_date("t", "c", "02/10/2024").is_err());
    }

    #[test]
    fn charges_for_unmapped_providers_are_dropped() {
        let config = EngineConfig::default();
        let kept = charge(raw_charge("ASHFORD, DANIEL"), &config).unwrap().unwrap();
        assert_eq!(kept.provider, "Ashford");
        assert_eq!(kept.posted_date, NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());

        assert!(charge(raw_charge("STRANGER, PAT"), &config).unwrap().is_none());
    }
}
