use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use crate::classify::TaggedVisit;
use crate::dedup::{self, PatientDay};
use crate::models::Patient;

/// An office visit joined with the patient's panel, ready for volume counting.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeVisit {
    pub patient_id: String,
    pub date: NaiveDate,
    pub month: String,
    pub location: Option<String>,
    pub panel_location: Option<String>,
    pub panel_provider: Option<String>,
}

impl PatientDay for VolumeVisit {
    fn patient_id(&self) -> &str {
        &self.patient_id
    }

    fn day(&self) -> NaiveDate {
        self.date
    }
}

/// One (month, dimension) group. `dimension: None` is the unassigned group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeRow {
    pub month: String,
    pub dimension: Option<String>,
    pub visit_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Volumes {
    pub by_location: Vec<VolumeRow>,
    pub by_panel_location: Vec<VolumeRow>,
    pub by_panel_provider: Vec<VolumeRow>,
}

/// Office visits only, one per patient per day, with panel info attached.
pub fn volume_visits(visits: &[TaggedVisit], patients: &[Patient]) -> Vec<VolumeVisit> {
    let mut panel: HashMap<&str, &Patient> = HashMap::with_capacity(patients.len());
    for patient in patients {
        panel.entry(patient.patient_id.as_str()).or_insert(patient);
    }

    let office_visits = visits
        .iter()
        .filter(|tagged| tagged.facets.office_visit)
        .map(|tagged| {
            let patient = panel.get(tagged.visit.patient_id.as_str());
            VolumeVisit {
                patient_id: tagged.visit.patient_id.clone(),
                date: tagged.visit.date,
                month: tagged.month.clone(),
                location: tagged.visit.location.clone(),
                panel_location: patient.and_then(|p| p.panel_location.clone()),
                panel_provider: patient.and_then(|p| p.panel_provider.clone()),
            }
        })
        .collect();

    dedup::one_per_patient_day(office_visits)
}

fn rollup<F>(visits: &[VolumeVisit], dimension: F) -> Vec<VolumeRow>
where
    F: Fn(&VolumeVisit) -> Option<&String>,
{
    let mut counts: BTreeMap<(&str, Option<&String>), usize> = BTreeMap::new();
    for visit in visits {
        *counts.entry((visit.month.as_str(), dimension(visit))).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|((month, dimension), visit_count)| VolumeRow {
            month: month.to_string(),
            dimension: dimension.cloned(),
            visit_count,
        })
        .collect()
}

pub fn monthly_volumes(visits: &[VolumeVisit]) -> Volumes {
    Volumes {
        by_location: rollup(visits, |v| v.location.as_ref()),
        by_panel_location: rollup(visits, |v| v.panel_location.as_ref()),
        by_panel_provider: rollup(visits, |v| v.panel_provider.as_ref()),
    }
}
