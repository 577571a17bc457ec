use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{EngineError, Result};
use crate::pipeline::{PanelSources, ResidencySources, RvuSources};

/// Reads `<dir>/<table>.csv`. A missing file is fatal, an empty one is not.
pub fn read_table<T: DeserializeOwned>(dir: &Path, table: &str) -> Result<Vec<T>> {
    let path = dir.join(format!("{table}.csv"));
    if !path.is_file() {
        return Err(EngineError::MissingTable(path.display().to_string()));
    }

    let csv_error = |source| EngineError::Csv {
        table: table.to_string(),
        source,
    };
    let mut reader = csv::Reader::from_path(&path).map_err(csv_error)?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        rows.push(result.map_err(csv_error)?);
    }

    tracing::debug!(table, rows = rows.len(), "loaded csv table");
    Ok(rows)
}

pub fn panel_sources(dir: &Path) -> Result<PanelSources> {
    Ok(PanelSources {
        patients: read_table(dir, "patients")?,
        panels: read_table(dir, "patient_panels")?,
        encounters: read_table(dir, "encounters")?,
    })
}

pub fn residency_sources(dir: &Path) -> Result<ResidencySources> {
    Ok(ResidencySources {
        patients: read_table(dir, "patients")?,
        encounters: read_table(dir, "encounters_outpt")?,
        notes_inpt: read_table(dir, "notes_inpt")?,
        notes_ed: read_table(dir, "notes_ed")?,
    })
}

pub fn rvu_sources(dir: &Path) -> Result<RvuSources> {
    Ok(RvuSources {
        charges: read_table(dir, "charges")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RawEncounter, RawPatient};

    #[test]
    fn empty_fields_load_as_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("patients.csv"),
            "patient_id,sex,age,age_in_mo_under_3,city,state,pcp,panel_assignment_rule\n\
             p1,F,1,14,pullman,wa,,\n\
             p2,M,40,,moscow,id,\"CARVER, ELLIS\",Visit\n",
        )
        .unwrap();

        let patients: Vec<RawPatient> = read_table(dir.path(), "patients").unwrap();
        assert_eq!(patients.len(), 2);
        assert_eq!(patients[0].age_in_mo_under_3, Some(14));
        assert_eq!(patients[0].pcp, None);
        assert_eq!(patients[1].pcp.as_deref(), Some("CARVER, ELLIS"));
        assert_eq!(patients[1].age_in_mo_under_3, None);
    }

    #[test]
    fn encounter_rows_keep_text_dates_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("encounters.csv"),
            "patient_id,dept,encounter_date,encounter_time,encounter_type,billing_provider,\
             service_provider,appt_status,with_pcp,diagnoses,diagnoses_icd,level_of_service,\
             encounter_age,encounter_age_in_mo_under_3\n\
             p1,CC WPL FM RESIDENCY CLINIC,20240910,0930,CC OFFICE VISIT,,\"CARVER, ELLIS\",\
             Completed,true,Pregnancy,Z34.83,99213,29,\n",
        )
        .unwrap();

        let encounters: Vec<RawEncounter> = read_table(dir.path(), "encounters").unwrap();
        assert_eq!(encounters[0].encounter_date, "20240910");
        assert_eq!(encounters[0].with_pcp, Some(true));
        assert_eq!(encounters[0].billing_provider, None);
        assert_eq!(encounters[0].encounter_age, Some(29));
    }

    #[test]
    fn residency_reads_the_outpatient_encounter_file() {
        let dir = tempfile::tempdir().unwrap();
        for table in ["patients", "encounters", "notes_inpt", "notes_ed"] {
            std::fs::write(dir.path().join(format!("{table}.csv")), "patient_id\n").unwrap();
        }
        let err = residency_sources(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::MissingTable(path) if path.ends_with("encounters_outpt.csv")
        ));
    }

    #[test]
    fn missing_table_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = rvu_sources(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::MissingTable(path) if path.ends_with("charges.csv")));
    }
}
