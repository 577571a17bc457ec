use std::fmt::Write;

use chrono::NaiveDate;

use crate::acgme::{AcgmeStats, StatRow};

fn row_line(row: &StatRow) -> String {
    format!(
        "| {} | {} | {} ({}) | {} ({}) | {} | {} | {} | {} | {} | {} |",
        row.year,
        row.total_visits,
        row.patient_continuity.percent,
        row.patient_continuity.comment,
        row.provider_continuity.percent,
        row.provider_continuity.comment,
        row.peds.percent,
        row.geriatrics.percent,
        row.ob.percent,
        row.telehealth.percent,
        row.ed_adult_encounters + row.ed_peds_encounters,
        row.inpt_adult_encounters + row.inpt_peds_encounters,
    )
}

pub fn build_report(as_of: NaiveDate, stats: &AcgmeStats) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Residency ACGME Summary");
    let _ = writeln!(output, "Generated as of {as_of}");

    for resident in &stats.residents {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", resident.resident);

        if resident.years().is_empty() {
            let _ = writeln!(output, "No completed clinic visits recorded.");
        } else {
            let _ = writeln!(
                output,
                "| Year | Visits | Patient continuity | Provider continuity | Peds | Geriatrics \
                 | OB | Telehealth | ED | Inpatient |"
            );
            let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|---|");
            for row in &resident.rows {
                let _ = writeln!(output, "{}", row_line(row));
            }
        }

        if let Some(panel) = resident.total().and_then(|row| row.panel.as_ref()) {
            let _ = writeln!(output);
            let _ = writeln!(
                output,
                "Panel: {} patients, peds {} ({}), geriatrics {} ({})",
                panel.paneled_patients,
                panel.peds.percent,
                panel.peds.comment,
                panel.geriatrics.percent,
                panel.geriatrics.comment
            );
        }
    }

    output
}
