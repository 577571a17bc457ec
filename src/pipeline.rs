use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::acgme::{self, AcgmeStats};
use crate::calendar;
use crate::classify::{Classifier, TaggedCharge, TaggedNote, TaggedVisit};
use crate::cohort::{self, ResidentRoster};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::models::{
    NoteSource, Patient, RawCharge, RawEncounter, RawNote, RawPanelAssignment, RawPatient,
};
use crate::normalize;
use crate::rvu::{self, RvuSummary};
use crate::summary::SummaryIndex;
use crate::volumes::{self, VolumeVisit, Volumes};

#[derive(Debug, Clone, Default)]
pub struct PanelSources {
    pub patients: Vec<RawPatient>,
    pub panels: Vec<RawPanelAssignment>,
    pub encounters: Vec<RawEncounter>,
}

#[derive(Debug, Clone, Default)]
pub struct ResidencySources {
    pub patients: Vec<RawPatient>,
    pub encounters: Vec<RawEncounter>,
    pub notes_inpt: Vec<RawNote>,
    pub notes_ed: Vec<RawNote>,
}

#[derive(Debug, Clone, Default)]
pub struct RvuSources {
    pub charges: Vec<RawCharge>,
}

/// Patient-panel dashboard tables.
#[derive(Debug, Clone)]
pub struct PanelDatamart {
    pub patients: Vec<Patient>,
    /// Every completed encounter in the volume window.
    pub encounters: Vec<TaggedVisit>,
    /// Office visits, one per patient per day. Only volumes read this view.
    pub volume_visits: Vec<VolumeVisit>,
    pub volumes: Volumes,
    pub index: SummaryIndex,
}

/// Residency (ACGME) dashboard tables.
#[derive(Debug, Clone)]
pub struct ResidencyDatamart {
    /// Completed resident clinic visits, not deduplicated.
    pub encounters: Vec<TaggedVisit>,
    pub notes: Vec<TaggedNote>,
    pub residents: BTreeMap<String, Vec<String>>,
    pub stats: AcgmeStats,
}

#[derive(Debug, Clone)]
pub struct RvuDatamart {
    pub charges: Vec<TaggedCharge>,
    pub summary: RvuSummary,
}

#[derive(Serialize)]
struct PanelKv<'a> {
    clinics: &'a [String],
    providers: &'a BTreeMap<String, Vec<String>>,
    all_providers: Vec<String>,
}

#[derive(Serialize)]
struct ResidencyKv<'a> {
    residents: &'a BTreeMap<String, Vec<String>>,
    stats: &'a AcgmeStats,
}

impl PanelDatamart {
    pub fn kv_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&PanelKv {
            clinics: &self.index.clinics,
            providers: &self.index.providers,
            all_providers: self.index.all_providers(),
        })
    }
}

impl ResidencyDatamart {
    pub fn kv_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&ResidencyKv {
            residents: &self.residents,
            stats: &self.stats,
        })
    }
}

impl RvuDatamart {
    pub fn kv_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.summary)
    }
}

/// Runs the aggregation stages over one snapshot. Results depend only on the
/// sources, the config and `as_of`.
pub struct Engine<'a> {
    config: &'a EngineConfig,
    classifier: Classifier,
    roster: ResidentRoster,
    as_of: NaiveDate,
}

impl<'a> Engine<'a> {
    pub fn new(config: &'a EngineConfig, as_of: NaiveDate) -> Result<Self> {
        Ok(Self {
            classifier: Classifier::new(config)?,
            roster: ResidentRoster::from_config(config),
            config,
            as_of,
        })
    }

    pub fn panel(&self, sources: PanelSources) -> Result<PanelDatamart> {
        let since = calendar::window_start(self.as_of, self.config.volume_window_days);

        let mut visits = Vec::new();
        for raw in sources.encounters {
            if !cohort::is_completed(&raw, self.config) {
                continue;
            }
            let visit = normalize::visit(raw, self.config)?;
            if cohort::within_window(visit.date, since) {
                visits.push(visit);
            }
        }
        tracing::info!(encounters = visits.len(), %since, "completed encounters in window");

        let patients = cohort::patients_with_visits(
            normalize::patients(sources.patients, &sources.panels),
            &visits,
        );
        let encounters: Vec<TaggedVisit> = visits
            .into_iter()
            .map(|visit| self.classifier.tag_visit(visit))
            .collect();

        let volume_visits = volumes::volume_visits(&encounters, &patients);
        let volumes = volumes::monthly_volumes(&volume_visits);
        let index = SummaryIndex::build(&patients);
        tracing::info!(
            patients = patients.len(),
            office_visits = volume_visits.len(),
            clinics = index.clinics.len(),
            "panel datamart built"
        );

        Ok(PanelDatamart {
            patients,
            encounters,
            volume_visits,
            volumes,
            index,
        })
    }

    pub fn residency(&self, sources: ResidencySources) -> Result<ResidencyDatamart> {
        let mut encounters = Vec::new();
        for raw in sources.encounters {
            if !cohort::is_completed(&raw, self.config) {
                continue;
            }
            let visit = normalize::visit(raw, self.config)?;
            if cohort::is_resident_visit(&visit, &self.roster) {
                encounters.push(self.classifier.tag_visit(visit));
            }
        }
        encounters.sort_by_key(|v| v.visit.date);

        let mut notes = self.resident_notes(sources.notes_inpt, NoteSource::Inpatient)?;
        notes.extend(self.resident_notes(sources.notes_ed, NoteSource::Ed)?);

        let ambiguous = notes.iter().filter(|n| n.ambiguous_author).count();
        if ambiguous > 0 {
            tracing::warn!(
                ambiguous,
                "notes name two different residents; credited to the signing author"
            );
        }

        let patients = normalize::patients(sources.patients, &[]);
        let stats = acgme::compute(&encounters, &notes, &patients, &self.roster);
        tracing::info!(
            encounters = encounters.len(),
            notes = notes.len(),
            residents = self.roster.names().len(),
            "residency datamart built"
        );

        Ok(ResidencyDatamart {
            encounters,
            notes,
            residents: self.config.residents_by_class(),
            stats,
        })
    }

    fn resident_notes(&self, raw: Vec<RawNote>, source: NoteSource) -> Result<Vec<TaggedNote>> {
        let mut notes = Vec::new();
        for row in raw {
            let note = normalize::note(row, source)?;
            if !cohort::is_countable_note(&note, &self.roster, self.config) {
                continue;
            }
            if let Some(credit) = self.roster.attribute(&note) {
                notes.push(self.classifier.tag_note(note, credit.resident, credit.ambiguous));
            }
        }
        notes.sort_by_key(|n| n.note.service_date);
        Ok(notes)
    }

    pub fn rvu(&self, sources: RvuSources) -> Result<RvuDatamart> {
        let since = calendar::lookback_start(self.as_of, self.config.charge_lookback_years);

        let mut charges = Vec::new();
        for raw in sources.charges {
            let Some(charge) = normalize::charge(raw, self.config)? else {
                continue;
            };
            if cohort::is_countable_charge(&charge, since) {
                charges.push(self.classifier.tag_charge(charge));
            }
        }

        let summary = rvu::summarize(&charges, self.config.provider_alias_names());
        tracing::info!(charges = charges.len(), %since, "rvu datamart built");
        Ok(RvuDatamart { charges, summary })
    }
}
