use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::calendar;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::models::{Charge, Note, NoteSource, Visit};

pub const PEDS_MAX_AGE_EXCLUSIVE: i32 = 18;
pub const GERIATRIC_MIN_AGE_EXCLUSIVE: i32 = 65;

pub fn is_peds(age: Option<i32>) -> bool {
    age.is_some_and(|age| age < PEDS_MAX_AGE_EXCLUSIVE)
}

pub fn is_geriatric(age: Option<i32>) -> bool {
    age.is_some_and(|age| age > GERIATRIC_MIN_AGE_EXCLUSIVE)
}

/// Independent, non-exclusive facets of a clinic visit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisitFacets {
    pub office_visit: bool,
    pub ob: bool,
    pub peds: bool,
    pub geriatrics: bool,
    pub telehealth: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedVisit {
    #[serde(flatten)]
    pub visit: Visit,
    #[serde(flatten)]
    pub facets: VisitFacets,
    pub month: String,
    pub academic_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedNote {
    #[serde(flatten)]
    pub note: Note,
    pub resident: String,
    pub ambiguous_author: bool,
    pub ed: bool,
    pub peds: bool,
    pub academic_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedCharge {
    #[serde(flatten)]
    pub charge: Charge,
    pub month: String,
    pub quarter: String,
    pub posted_month: String,
    pub posted_quarter: String,
    pub medicaid: bool,
    pub inpatient: bool,
}

/// Compiled predicates over the fixed code lists. Build once per run.
#[derive(Debug)]
pub struct Classifier {
    office_visit_types: HashSet<String>,
    ob_diagnosis: Option<Regex>,
    ob_level_of_service: HashSet<String>,
    telehealth_type: String,
    inpatient_location: Option<Regex>,
    medicaid: Regex,
}

fn alternation(items: &[String]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let escaped: Vec<String> = items.iter().map(|item| regex::escape(item)).collect();
    Some(escaped.join("|"))
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|err| EngineError::Config(err.to_string()))
}

impl Classifier {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let ob_diagnosis = alternation(&config.ob_icd_codes)
            .map(|pattern| compile(&pattern, false))
            .transpose()?;
        let inpatient_location = alternation(&config.inpatient_locations)
            .map(|pattern| compile(&format!("^(?:{pattern})$"), true))
            .transpose()?;

        Ok(Self {
            office_visit_types: config.office_visit_types.iter().cloned().collect(),
            ob_diagnosis,
            ob_level_of_service: config.ob_level_of_service.iter().cloned().collect(),
            telehealth_type: config.telehealth_type.clone(),
            inpatient_location,
            medicaid: compile("^medicaid", true)?,
        })
    }

    pub fn is_office_visit(&self, visit: &Visit) -> bool {
        self.office_visit_types.contains(&visit.encounter_type)
    }

    /// Any OB ICD code appearing anywhere in the diagnosis text, or an OB level of service.
    pub fn is_ob(&self, visit: &Visit) -> bool {
        let by_diagnosis = match (&self.ob_diagnosis, visit.diagnoses_icd.as_deref()) {
            (Some(pattern), Some(icd)) => pattern.is_match(icd),
            _ => false,
        };
        by_diagnosis
            || visit
                .level_of_service
                .as_ref()
                .is_some_and(|los| self.ob_level_of_service.contains(los))
    }

    pub fn is_telehealth(&self, visit: &Visit) -> bool {
        visit.encounter_type == self.telehealth_type
    }

    pub fn is_inpatient_location(&self, location: Option<&str>) -> bool {
        match (&self.inpatient_location, location) {
            (Some(pattern), Some(location)) => pattern.is_match(location),
            _ => false,
        }
    }

    pub fn is_medicaid(&self, insurance_class: Option<&str>) -> bool {
        insurance_class.is_some_and(|class| self.medicaid.is_match(class))
    }

    pub fn facets(&self, visit: &Visit) -> VisitFacets {
        VisitFacets {
            office_visit: self.is_office_visit(visit),
            ob: self.is_ob(visit),
            peds: is_peds(visit.age),
            geriatrics: is_geriatric(visit.age),
            telehealth: self.is_telehealth(visit),
        }
    }

    pub fn tag_visit(&self, visit: Visit) -> TaggedVisit {
        TaggedVisit {
            facets: self.facets(&visit),
            month: calendar::month_label(visit.date),
            academic_year: calendar::academic_year(visit.date),
            visit,
        }
    }

    pub fn tag_note(&self, note: Note, resident: String, ambiguous_author: bool) -> TaggedNote {
        TaggedNote {
            ed: note.source == NoteSource::Ed,
            peds: is_peds(note.age),
            academic_year: calendar::academic_year(note.service_date),
            resident,
            ambiguous_author,
            note,
        }
    }

    pub fn tag_charge(&self, charge: Charge) -> TaggedCharge {
        TaggedCharge {
            month: calendar::month_label(charge.date),
            quarter: calendar::quarter_label(charge.date),
            posted_month: calendar::month_label(charge.posted_date),
            posted_quarter: calendar::quarter_label(charge.posted_date),
            medicaid: self.is_medicaid(charge.insurance_class.as_deref()),
            inpatient: self.is_inpatient_location(charge.location.as_deref()),
            charge,
        }
    }
}
