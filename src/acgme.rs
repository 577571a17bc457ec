use std::collections::BTreeSet;
use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::classify::{is_geriatric, is_peds, TaggedNote, TaggedVisit};
use crate::cohort::ResidentRoster;
use crate::continuity::{self, Share};
use crate::models::Patient;

pub const OVERALL: &str = "Overall";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearLabel {
    Year(i32),
    Total,
}

impl fmt::Display for YearLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Year(year) => write!(f, "{year}"),
            Self::Total => f.write_str("Total"),
        }
    }
}

impl Serialize for YearLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Year(year) => serializer.serialize_i32(*year),
            Self::Total => serializer.serialize_str("Total"),
        }
    }
}

/// Panel composition, reported on the Total row only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelStats {
    pub paneled_patients: usize,
    pub peds: Share,
    pub geriatrics: Share,
}

/// One (cohort, academic year or Total) cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatRow {
    pub year: YearLabel,
    pub total_visits: usize,
    pub patient_continuity: Share,
    pub provider_continuity: Share,
    pub peds: Share,
    pub geriatrics: Share,
    pub ob: Share,
    pub telehealth: Share,
    pub ed_adult_encounters: usize,
    pub ed_peds_encounters: usize,
    pub inpt_adult_encounters: usize,
    pub inpt_peds_encounters: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel: Option<PanelStats>,
}

/// Rows for one resident (or the Overall pseudo-resident): qualifying years
/// newest first, then Total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidentStats {
    pub resident: String,
    pub rows: Vec<StatRow>,
}

impl ResidentStats {
    pub fn total(&self) -> Option<&StatRow> {
        self.rows.iter().find(|row| row.year == YearLabel::Total)
    }

    pub fn years(&self) -> Vec<i32> {
        self.rows
            .iter()
            .filter_map(|row| match row.year {
                YearLabel::Year(year) => Some(year),
                YearLabel::Total => None,
            })
            .collect()
    }
}

impl Serialize for ResidentStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rows.len()))?;
        for row in &self.rows {
            map.serialize_entry(&row.year.to_string(), row)?;
        }
        map.end()
    }
}

/// Stats for every tracked resident in roster order, then Overall.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcgmeStats {
    pub residents: Vec<ResidentStats>,
}

impl AcgmeStats {
    pub fn get(&self, resident: &str) -> Option<&ResidentStats> {
        self.residents.iter().find(|stats| stats.resident == resident)
    }
}

impl Serialize for AcgmeStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.residents.len()))?;
        for stats in &self.residents {
            map.serialize_entry(&stats.resident, stats)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy)]
enum Cohort<'a> {
    Resident(&'a str),
    Overall,
}

impl Cohort<'_> {
    fn owns_visit(&self, visit: &TaggedVisit) -> bool {
        match self {
            Self::Resident(name) => visit.visit.service_provider.as_deref() == Some(*name),
            Self::Overall => true,
        }
    }

    fn owns_note(&self, note: &TaggedNote) -> bool {
        match self {
            Self::Resident(name) => note.resident == *name,
            Self::Overall => true,
        }
    }

    fn owns_patient(&self, patient: &Patient, roster: &ResidentRoster) -> bool {
        match self {
            Self::Resident(name) => patient.pcp.as_deref() == Some(*name),
            Self::Overall => roster.contains(patient.pcp.as_deref()),
        }
    }

    fn label(&self) -> String {
        match self {
            Self::Resident(name) => name.to_string(),
            Self::Overall => OVERALL.to_string(),
        }
    }
}

/// `visits` are the raw (not deduplicated) resident clinic visits and `notes`
/// the countable resident notes; `patients` supplies PCP panels.
pub fn compute(
    visits: &[TaggedVisit],
    notes: &[TaggedNote],
    patients: &[Patient],
    roster: &ResidentRoster,
) -> AcgmeStats {
    let mut residents: Vec<ResidentStats> = roster
        .names()
        .iter()
        .map(|name| cohort_stats(Cohort::Resident(name), visits, notes, patients, roster))
        .collect();
    residents.push(cohort_stats(Cohort::Overall, visits, notes, patients, roster));
    AcgmeStats { residents }
}

fn cohort_stats(
    cohort: Cohort<'_>,
    visits: &[TaggedVisit],
    notes: &[TaggedNote],
    patients: &[Patient],
    roster: &ResidentRoster,
) -> ResidentStats {
    let cohort_visits: Vec<&TaggedVisit> = visits.iter().filter(|v| cohort.owns_visit(v)).collect();

    // Years with clinic visits; notes from other years are med-student template notes.
    let years: BTreeSet<i32> = cohort_visits.iter().map(|v| v.academic_year).collect();
    let population: Vec<&TaggedVisit> = visits
        .iter()
        .filter(|v| years.contains(&v.academic_year))
        .collect();
    let cohort_notes: Vec<&TaggedNote> = notes
        .iter()
        .filter(|n| cohort.owns_note(n) && years.contains(&n.academic_year))
        .collect();

    let mut rows: Vec<StatRow> = years
        .iter()
        .rev()
        .map(|&year| {
            let in_year = |v: &&&TaggedVisit| v.academic_year == year;
            let year_population: Vec<&TaggedVisit> =
                population.iter().filter(in_year).copied().collect();
            let year_visits: Vec<&TaggedVisit> =
                cohort_visits.iter().filter(in_year).copied().collect();
            let year_notes: Vec<&TaggedNote> = cohort_notes
                .iter()
                .filter(|n| n.academic_year == year)
                .copied()
                .collect();
            stat_row(YearLabel::Year(year), &year_population, &year_visits, &year_notes)
        })
        .collect();

    let mut total = stat_row(YearLabel::Total, &population, &cohort_visits, &cohort_notes);
    total.panel = Some(panel_stats(
        patients.iter().filter(|p| cohort.owns_patient(p, roster)),
    ));
    rows.push(total);

    ResidentStats {
        resident: cohort.label(),
        rows,
    }
}

fn stat_row(
    year: YearLabel,
    population: &[&TaggedVisit],
    visits: &[&TaggedVisit],
    notes: &[&TaggedNote],
) -> StatRow {
    let total = visits.len();
    let count = |facet: fn(&TaggedVisit) -> bool| visits.iter().filter(|v| facet(v)).count();
    let notes_where = |ed: bool, peds: bool| {
        notes
            .iter()
            .filter(|n| n.ed == ed && n.peds == peds)
            .count()
    };

    StatRow {
        year,
        total_visits: total,
        patient_continuity: continuity::patient_continuity(visits, population),
        provider_continuity: continuity::provider_continuity(visits),
        peds: Share::visits(count(|v| v.facets.peds), total),
        geriatrics: Share::visits(count(|v| v.facets.geriatrics), total),
        ob: Share::visits(count(|v| v.facets.ob), total),
        telehealth: Share::visits(count(|v| v.facets.telehealth), total),
        ed_adult_encounters: notes_where(true, false),
        ed_peds_encounters: notes_where(true, true),
        inpt_adult_encounters: notes_where(false, false),
        inpt_peds_encounters: notes_where(false, true),
        panel: None,
    }
}

fn panel_stats<'a>(panel: impl Iterator<Item = &'a Patient>) -> PanelStats {
    let mut size = 0;
    let mut peds = 0;
    let mut geriatrics = 0;
    for patient in panel {
        size += 1;
        if is_peds(patient.age) {
            peds += 1;
        }
        if is_geriatric(patient.age) {
            geriatrics += 1;
        }
    }

    PanelStats {
        paneled_patients: size,
        peds: Share::new(peds, size, "pts"),
        geriatrics: Share::new(geriatrics, size, "pts"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::config::EngineConfig;
    use crate::models::{Note, NoteSource, Visit};
    use chrono::NaiveDate;

    const RES_A: &str = "A, ONE";
    const RES_B: &str = "B, TWO";

    fn roster() -> ResidentRoster {
        ResidentRoster::new(vec![RES_A.to_string(), RES_B.to_string()])
    }

    fn classifier() -> Classifier {
        Classifier::new(&EngineConfig::default()).unwrap()
    }

    fn visit(
        patient: &str,
        provider: &str,
        date: (i32, u32, u32),
        age: i32,
        with_pcp: bool,
    ) -> TaggedVisit {
        classifier().tag_visit(Visit {
            patient_id: patient.to_string(),
            location: Some("Residency".to_string()),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            age: Some(age),
            age_in_mo_under_3: None,
            encounter_type: "CC OFFICE VISIT".to_string(),
            service_provider: Some(provider.to_string()),
            with_pcp,
            diagnoses: None,
            diagnoses_icd: None,
            level_of_service: None,
        })
    }

    fn note(resident: &str, date: (i32, u32, u32), age: i32, source: NoteSource) -> TaggedNote {
        classifier().tag_note(
            Note {
                patient_id: "p9".to_string(),
                service_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
                dept: "CC WPL MED SURG".to_string(),
                note_type: "Progress Notes".to_string(),
                signing_author: Some(resident.to_string()),
                initial_author: None,
                cosign_author: None,
                age: Some(age),
                source,
            },
            resident.to_string(),
            false,
        )
    }

    fn patient(id: &str, pcp: &str, age: i32) -> Patient {
        Patient {
            patient_id: id.to_string(),
            sex: "F".to_string(),
            age: Some(age),
            age_in_mo_under_3: None,
            age_display: Some(age.to_string()),
            location: None,
            pcp: Some(pcp.to_string()),
            panel_location: None,
            panel_provider: None,
            panel_assignment_rule: None,
        }
    }

    #[test]
    fn rows_are_qualifying_years_descending_then_total() {
        let visits = vec![
            visit("p1", RES_A, (2022, 8, 1), 30, true),
            visit("p2", RES_A, (2024, 3, 1), 30, false),
            visit("p3", RES_B, (2021, 9, 1), 30, false),
        ];
        let notes = vec![
            note(RES_A, (2021, 10, 1), 40, NoteSource::Inpatient),
            note(RES_A, (2023, 10, 1), 40, NoteSource::Ed),
        ];

        let stats = compute(&visits, &notes, &[], &roster());
        let a = stats.get(RES_A).unwrap();
        assert_eq!(a.years(), vec![2023, 2022]);
        let labels: Vec<String> = a.rows.iter().map(|r| r.year.to_string()).collect();
        assert_eq!(labels, vec!["2023", "2022", "Total"]);

        // The 2021 note falls outside A's clinic years.
        let total = a.total().unwrap();
        assert_eq!(total.inpt_adult_encounters, 0);
        assert_eq!(total.ed_adult_encounters, 1);

        let names: Vec<&str> = stats.residents.iter().map(|r| r.resident.as_str()).collect();
        assert_eq!(names, vec![RES_A, RES_B, OVERALL]);
        assert_eq!(stats.get(OVERALL).unwrap().years(), vec![2023, 2022, 2021]);
    }

    #[test]
    fn total_recomputes_ratios_over_all_years() {
        let visits = vec![
            visit("p1", RES_A, (2022, 8, 1), 10, true),
            visit("p2", RES_A, (2023, 8, 1), 30, false),
            visit("p3", RES_A, (2023, 8, 2), 30, false),
            visit("p4", RES_A, (2023, 8, 3), 70, false),
        ];

        let stats = compute(&visits, &[], &[], &roster());
        let a = stats.get(RES_A).unwrap();
        assert_eq!(a.rows[0].provider_continuity.percent, "0%");
        assert_eq!(a.rows[1].provider_continuity.percent, "100%");

        let total = a.total().unwrap();
        assert_eq!(total.total_visits, 4);
        assert_eq!(total.provider_continuity.percent, "25%");
        assert_eq!(total.provider_continuity.comment, "1/4 visits");
        assert_eq!(total.peds.comment, "1/4 visits");
        assert_eq!(total.geriatrics.percent, "25%");
    }

    #[test]
    fn patient_continuity_uses_whole_population_for_the_year() {
        let visits = vec![
            visit("p1", RES_A, (2023, 8, 1), 30, true),
            visit("p1", RES_B, (2023, 9, 1), 30, false),
            visit("p1", RES_B, (2023, 10, 1), 30, false),
            visit("p1", RES_B, (2022, 10, 1), 30, false),
        ];

        let stats = compute(&visits, &[], &[], &roster());
        let row = &stats.get(RES_A).unwrap().rows[0];
        assert_eq!(row.year, YearLabel::Year(2023));
        assert_eq!(row.patient_continuity.comment, "1/3 visits");
        assert_eq!(row.patient_continuity.percent, "33%");
        assert!(row.patient_continuity.total >= row.provider_continuity.count);
    }

    #[test]
    fn note_encounters_split_by_setting_and_age() {
        let visits = vec![visit("p1", RES_A, (2023, 8, 1), 30, false)];
        let notes = vec![
            note(RES_A, (2023, 9, 1), 40, NoteSource::Ed),
            note(RES_A, (2023, 9, 1), 40, NoteSource::Ed),
            note(RES_A, (2023, 9, 2), 4, NoteSource::Ed),
            note(RES_A, (2023, 9, 3), 50, NoteSource::Inpatient),
            note(RES_A, (2023, 9, 4), 0, NoteSource::Inpatient),
            note(RES_B, (2023, 9, 4), 0, NoteSource::Inpatient),
        ];

        let stats = compute(&visits, &notes, &[], &roster());
        let row = &stats.get(RES_A).unwrap().rows[0];
        assert_eq!(row.ed_adult_encounters, 2);
        assert_eq!(row.ed_peds_encounters, 1);
        assert_eq!(row.inpt_adult_encounters, 1);
        assert_eq!(row.inpt_peds_encounters, 1);

        // B has no clinic visits, so only a Total row with nothing in it.
        let b = stats.get(RES_B).unwrap();
        assert_eq!(b.rows.len(), 1);
        assert_eq!(b.total().unwrap().inpt_peds_encounters, 0);
        assert_eq!(b.total().unwrap().total_visits, 0);
        assert_eq!(b.total().unwrap().peds.percent, "0%");
    }

    #[test]
    fn panel_stats_only_on_total() {
        let visits = vec![visit("p1", RES_A, (2023, 8, 1), 30, false)];
        let patients = vec![
            patient("p1", RES_A, 5),
            patient("p2", RES_A, 40),
            patient("p3", RES_A, 80),
            patient("p4", RES_A, 18),
            patient("p5", RES_B, 2),
            patient("p6", "ATTENDING, X", 2),
        ];

        let stats = compute(&visits, &[], &patients, &roster());
        let a = stats.get(RES_A).unwrap();
        assert!(a.rows[0].panel.is_none());
        let panel = a.total().unwrap().panel.as_ref().unwrap();
        assert_eq!(panel.paneled_patients, 4);
        assert_eq!(panel.peds.comment, "1/4 pts");
        assert_eq!(panel.peds.percent, "25%");
        assert_eq!(panel.geriatrics.count, 1);

        let overall = stats.get(OVERALL).unwrap().total().unwrap().panel.clone().unwrap();
        assert_eq!(overall.paneled_patients, 5);
        assert_eq!(overall.peds.comment, "2/5 pts");

        let empty = stats.get(RES_B).unwrap().total().unwrap().panel.clone().unwrap();
        assert_eq!(empty.paneled_patients, 1);
    }

    #[test]
    fn stats_serialize_as_nested_maps() {
        let visits = vec![visit("p1", RES_A, (2023, 8, 1), 30, true)];
        let stats = compute(&visits, &[], &[], &roster());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json[RES_A]["2023"]["year"], 2023);
        assert_eq!(json[RES_A]["Total"]["year"], "Total");
        assert_eq!(json[RES_A]["Total"]["provider_continuity"]["percent"], "100%");
        assert!(json[RES_A]["2023"].get("panel").is_none());
        assert_eq!(json[OVERALL]["Total"]["panel"]["paneled_patients"], 0);
    }
}
