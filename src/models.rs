use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// Source rows, exactly as the warehouse (or a CSV snapshot) hands them over.
// Dates stay as text here; the normalizer owns parsing.

#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct RawPatient {
    pub patient_id: String,
    pub sex: String,
    pub age: Option<i32>,
    pub age_in_mo_under_3: Option<i32>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pcp: Option<String>,
    pub panel_assignment_rule: Option<String>,
}

#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct RawPanelAssignment {
    pub patient_id: String,
    pub panel_location: Option<String>,
    pub panel_provider: Option<String>,
}

#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct RawEncounter {
    pub patient_id: String,
    pub dept: String,
    pub encounter_date: String,
    pub encounter_time: Option<String>,
    pub encounter_type: String,
    pub billing_provider: Option<String>,
    pub service_provider: Option<String>,
    pub appt_status: String,
    pub with_pcp: Option<bool>,
    pub diagnoses: Option<String>,
    pub diagnoses_icd: Option<String>,
    pub level_of_service: Option<String>,
    pub encounter_age: Option<i32>,
    pub encounter_age_in_mo_under_3: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct RawNote {
    pub patient_id: String,
    pub service_date: String,
    pub dept: String,
    pub note_type: String,
    pub signing_author: Option<String>,
    pub initial_author: Option<String>,
    pub cosign_author: Option<String>,
    pub encounter_age: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, sqlx::FromRow)]
pub struct RawCharge {
    pub patient_id: String,
    pub service_date: String,
    pub post_date: String,
    pub billing_provider: String,
    pub procedure_code: Option<String>,
    pub modifiers: Option<String>,
    pub procedure_desc: Option<String>,
    pub quantity: Option<i32>,
    pub wrvu: Option<f64>,
    pub reversal_reason: Option<String>,
    pub insurance_class: Option<String>,
    pub location: Option<String>,
}

// Canonical records produced by the normalizer.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Patient {
    pub patient_id: String,
    pub sex: String,
    pub age: Option<i32>,
    pub age_in_mo_under_3: Option<i32>,
    pub age_display: Option<String>,
    pub location: Option<String>,
    pub pcp: Option<String>,
    pub panel_location: Option<String>,
    pub panel_provider: Option<String>,
    pub panel_assignment_rule: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visit {
    pub patient_id: String,
    pub location: Option<String>,
    pub date: NaiveDate,
    pub age: Option<i32>,
    pub age_in_mo_under_3: Option<i32>,
    pub encounter_type: String,
    pub service_provider: Option<String>,
    pub with_pcp: bool,
    pub diagnoses: Option<String>,
    pub diagnoses_icd: Option<String>,
    pub level_of_service: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteSource {
    Inpatient,
    Ed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub patient_id: String,
    pub service_date: NaiveDate,
    pub dept: String,
    pub note_type: String,
    pub signing_author: Option<String>,
    pub initial_author: Option<String>,
    pub cosign_author: Option<String>,
    pub age: Option<i32>,
    pub source: NoteSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Charge {
    pub patient_id: String,
    pub date: NaiveDate,
    pub posted_date: NaiveDate,
    pub provider: String,
    pub cpt: Option<String>,
    pub modifiers: Option<String>,
    pub cpt_desc: Option<String>,
    pub quantity: Option<i32>,
    pub wrvu: Option<f64>,
    pub reversal_reason: Option<String>,
    pub insurance_class: Option<String>,
    pub location: Option<String>,
}
