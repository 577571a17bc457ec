use std::collections::HashSet;

use serde::Serialize;

use crate::classify::TaggedVisit;

/// A count out of a denominator, with its dashboard renderings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Share {
    pub count: usize,
    pub total: usize,
    pub percent: String,
    pub comment: String,
}

impl Share {
    pub fn new(count: usize, total: usize, unit: &str) -> Self {
        Self {
            count,
            total,
            percent: percent(count, total),
            comment: format!("{count}/{total} {unit}"),
        }
    }

    pub fn visits(count: usize, total: usize) -> Self {
        Self::new(count, total, "visits")
    }
}

/// Whole-number percentage; an empty denominator reads as 0%.
pub fn percent(count: usize, total: usize) -> String {
    if total == 0 {
        return "0%".to_string();
    }
    format!("{:.0}%", count as f64 / total as f64 * 100.0)
}

/// Share of the cohort's visits where the patient saw their own PCP.
pub fn provider_continuity(cohort_visits: &[&TaggedVisit]) -> Share {
    let with_pcp = cohort_visits.iter().filter(|v| v.visit.with_pcp).count();
    Share::visits(with_pcp, cohort_visits.len())
}

/// The cohort's own-PCP visits against every visit, by anyone in the comparison
/// population, made by the patients behind those own-PCP visits.
pub fn patient_continuity(cohort_visits: &[&TaggedVisit], population: &[&TaggedVisit]) -> Share {
    let with_pcp: Vec<&&TaggedVisit> = cohort_visits.iter().filter(|v| v.visit.with_pcp).collect();
    let patients: HashSet<&str> = with_pcp.iter().map(|v| v.visit.patient_id.as_str()).collect();
    let reference = population
        .iter()
        .filter(|v| patients.contains(v.visit.patient_id.as_str()))
        .count();
    Share::visits(with_pcp.len(), reference)
}
