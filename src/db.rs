use anyhow::Context;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::classify::{TaggedCharge, TaggedNote, TaggedVisit};
use crate::models::{Patient, RawCharge, RawEncounter, RawNote, RawPanelAssignment, RawPatient};
use crate::pipeline::{
    PanelDatamart, PanelSources, ResidencyDatamart, ResidencySources, RvuDatamart, RvuSources,
};
use crate::volumes::VolumeRow;

// Keeps every multi-row INSERT well under the Postgres bind-parameter limit.
const BATCH_ROWS: usize = 1000;

const PATIENTS_SQL: &str = r#"
    SELECT prw_id AS patient_id, sex, age::int4 AS age,
           age_in_mo_under_3::int4 AS age_in_mo_under_3, city, state, pcp,
           panel_assignment_rule
    FROM prw_patients
    ORDER BY id
"#;

const PANELS_SQL: &str = r#"
    SELECT prw_id AS patient_id, panel_location, panel_provider
    FROM prw_patient_panels
    ORDER BY id
"#;

// `prw_encounters` feeds the panel datamart; residency stats only count
// outpatient clinic encounters from `prw_encounters_outpt`.
const PANEL_ENCOUNTERS_TABLE: &str = "prw_encounters";
const OUTPT_ENCOUNTERS_TABLE: &str = "prw_encounters_outpt";

// Mirrors `cohort::is_countable_charge` and the alias-table check so the
// warehouse only ships rows the RVU datamart can use.
const CHARGES_SQL: &str = r#"
    SELECT prw_id AS patient_id, CAST(service_date AS TEXT) AS service_date,
           CAST(post_date AS TEXT) AS post_date, billing_provider, procedure_code,
           modifiers, procedure_desc, quantity::int4 AS quantity, wrvu::float8 AS wrvu,
           reversal_reason, primary_payor_class AS insurance_class, location
    FROM prw_charges
    WHERE (modifiers NOT LIKE '%FAC%' OR modifiers IS NULL)
      AND (wrvu <> 0 OR wrvu IS NULL)
      AND billing_provider = ANY($1)
      AND service_date >= $2
    ORDER BY id
"#;

fn encounters_sql(table: &str) -> String {
    format!(
        "SELECT prw_id AS patient_id, dept, CAST(encounter_date AS TEXT) AS encounter_date, \
         CAST(encounter_time AS TEXT) AS encounter_time, encounter_type, billing_provider, \
         service_provider, appt_status, with_pcp, diagnoses, diagnoses_icd, level_of_service, \
         encounter_age::int4 AS encounter_age, \
         encounter_age_in_mo_under_3::int4 AS encounter_age_in_mo_under_3 \
         FROM {table} ORDER BY id"
    )
}

fn notes_sql(table: &str) -> String {
    format!(
        "SELECT prw_id AS patient_id, CAST(service_date AS TEXT) AS service_date, dept, \
         note_type, author_name AS signing_author, first_author_name AS initial_author, \
         cosign_author_name AS cosign_author, encounter_age::int4 AS encounter_age \
         FROM {table} ORDER BY id"
    )
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

// Warehouse reads. Each failure names the table so a missing source aborts loudly.

pub async fn fetch_panel_sources(pool: &PgPool) -> anyhow::Result<PanelSources> {
    Ok(PanelSources {
        patients: fetch_patients(pool).await?,
        panels: sqlx::query_as::<_, RawPanelAssignment>(PANELS_SQL)
            .fetch_all(pool)
            .await
            .context("failed to read prw_patient_panels")?,
        encounters: fetch_encounters(pool, PANEL_ENCOUNTERS_TABLE).await?,
    })
}

pub async fn fetch_residency_sources(pool: &PgPool) -> anyhow::Result<ResidencySources> {
    Ok(ResidencySources {
        patients: fetch_patients(pool).await?,
        encounters: fetch_encounters(pool, OUTPT_ENCOUNTERS_TABLE).await?,
        notes_inpt: fetch_notes(pool, "prw_notes_inpt").await?,
        notes_ed: fetch_notes(pool, "prw_notes_ed").await?,
    })
}

/// Reads charges for the given billing providers with service dates on or after `since`.
pub async fn fetch_rvu_sources(
    pool: &PgPool,
    providers: &[String],
    since: NaiveDate,
) -> anyhow::Result<RvuSources> {
    let charges = sqlx::query_as::<_, RawCharge>(CHARGES_SQL)
        .bind(providers)
        .bind(since)
        .fetch_all(pool)
        .await
        .context("failed to read prw_charges")?;
    Ok(RvuSources { charges })
}

async fn fetch_patients(pool: &PgPool) -> anyhow::Result<Vec<RawPatient>> {
    sqlx::query_as::<_, RawPatient>(PATIENTS_SQL)
        .fetch_all(pool)
        .await
        .context("failed to read prw_patients")
}

async fn fetch_encounters(pool: &PgPool, table: &str) -> anyhow::Result<Vec<RawEncounter>> {
    let sql = encounters_sql(table);
    sqlx::query_as::<_, RawEncounter>(&sql)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to read {table}"))
}

async fn fetch_notes(pool: &PgPool, table: &str) -> anyhow::Result<Vec<RawNote>> {
    let sql = notes_sql(table);
    sqlx::query_as::<_, RawNote>(&sql)
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to read {table}"))
}

// Datamart writes. Each datamart is replaced wholesale inside one transaction.

pub async fn write_panel(pool: &PgPool, datamart: &PanelDatamart, kv: &str) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    clear(
        &mut tx,
        &[
            "datamart.patients",
            "datamart.panel_encounters",
            "datamart.volumes_by_location",
            "datamart.volumes_by_panel_location",
            "datamart.volumes_by_panel_provider",
        ],
    )
    .await?;

    insert_patients(&mut tx, &datamart.patients).await?;
    insert_visits(&mut tx, "datamart.panel_encounters", &datamart.encounters).await?;
    let volumes = &datamart.volumes;
    insert_volumes(
        &mut tx,
        "datamart.volumes_by_location",
        "location",
        &volumes.by_location,
    )
    .await?;
    insert_volumes(
        &mut tx,
        "datamart.volumes_by_panel_location",
        "panel_location",
        &volumes.by_panel_location,
    )
    .await?;
    insert_volumes(
        &mut tx,
        "datamart.volumes_by_panel_provider",
        "panel_provider",
        &volumes.by_panel_provider,
    )
    .await?;

    write_kv(&mut tx, "panel", kv).await?;
    write_meta(&mut tx, "panel").await?;
    tx.commit().await?;
    Ok(())
}

pub async fn write_residency(
    pool: &PgPool,
    datamart: &ResidencyDatamart,
    kv: &str,
) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    clear(&mut tx, &["datamart.resident_encounters", "datamart.notes"]).await?;
    insert_visits(&mut tx, "datamart.resident_encounters", &datamart.encounters).await?;
    insert_notes(&mut tx, &datamart.notes).await?;
    write_kv(&mut tx, "residency", kv).await?;
    write_meta(&mut tx, "residency").await?;
    tx.commit().await?;
    Ok(())
}

pub async fn write_rvu(pool: &PgPool, datamart: &RvuDatamart, kv: &str) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    clear(&mut tx, &["datamart.charges"]).await?;
    insert_charges(&mut tx, &datamart.charges).await?;
    write_kv(&mut tx, "rvu", kv).await?;
    write_meta(&mut tx, "rvu").await?;
    tx.commit().await?;
    Ok(())
}

async fn clear(tx: &mut Transaction<'_, Postgres>, tables: &[&str]) -> anyhow::Result<()> {
    for table in tables {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut **tx)
            .await
            .with_context(|| format!("failed to clear {table}"))?;
    }
    Ok(())
}

async fn insert_patients(
    tx: &mut Transaction<'_, Postgres>,
    patients: &[Patient],
) -> anyhow::Result<()> {
    for chunk in patients.chunks(BATCH_ROWS) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO datamart.patients (prw_id, sex, age, age_in_mo_under_3, age_display, \
             location, pcp, panel_location, panel_provider, panel_assignment_rule) ",
        );
        builder.push_values(chunk, |mut row, p| {
            row.push_bind(&p.patient_id)
                .push_bind(&p.sex)
                .push_bind(p.age)
                .push_bind(p.age_in_mo_under_3)
                .push_bind(&p.age_display)
                .push_bind(&p.location)
                .push_bind(&p.pcp)
                .push_bind(&p.panel_location)
                .push_bind(&p.panel_provider)
                .push_bind(&p.panel_assignment_rule);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn insert_visits(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    visits: &[TaggedVisit],
) -> anyhow::Result<()> {
    for chunk in visits.chunks(BATCH_ROWS) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {table} (prw_id, location, encounter_date, encounter_age, \
             encounter_age_in_mo_under_3, encounter_type, service_provider, with_pcp, \
             diagnoses, diagnoses_icd, level_of_service, office_visit, ob, peds, geriatrics, \
             telehealth, month, academic_year) "
        ));
        builder.push_values(chunk, |mut row, t| {
            let v = &t.visit;
            row.push_bind(&v.patient_id)
                .push_bind(&v.location)
                .push_bind(v.date)
                .push_bind(v.age)
                .push_bind(v.age_in_mo_under_3)
                .push_bind(&v.encounter_type)
                .push_bind(&v.service_provider)
                .push_bind(v.with_pcp)
                .push_bind(&v.diagnoses)
                .push_bind(&v.diagnoses_icd)
                .push_bind(&v.level_of_service)
                .push_bind(t.facets.office_visit)
                .push_bind(t.facets.ob)
                .push_bind(t.facets.peds)
                .push_bind(t.facets.geriatrics)
                .push_bind(t.facets.telehealth)
                .push_bind(&t.month)
                .push_bind(t.academic_year);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn insert_volumes(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    dimension: &str,
    rows: &[VolumeRow],
) -> anyhow::Result<()> {
    for chunk in rows.chunks(BATCH_ROWS) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {table} (year_month, {dimension}, visit_count) "
        ));
        builder.push_values(chunk, |mut row, volume| {
            row.push_bind(&volume.month)
                .push_bind(&volume.dimension)
                .push_bind(volume.visit_count as i64);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn insert_notes(
    tx: &mut Transaction<'_, Postgres>,
    notes: &[TaggedNote],
) -> anyhow::Result<()> {
    for chunk in notes.chunks(BATCH_ROWS) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO datamart.notes (prw_id, service_date, dept, note_type, signing_author, \
             initial_author, cosign_author, encounter_age, resident, ambiguous_author, ed, peds, \
             academic_year) ",
        );
        builder.push_values(chunk, |mut row, t| {
            let n = &t.note;
            row.push_bind(&n.patient_id)
                .push_bind(n.service_date)
                .push_bind(&n.dept)
                .push_bind(&n.note_type)
                .push_bind(&n.signing_author)
                .push_bind(&n.initial_author)
                .push_bind(&n.cosign_author)
                .push_bind(n.age)
                .push_bind(&t.resident)
                .push_bind(t.ambiguous_author)
                .push_bind(t.ed)
                .push_bind(t.peds)
                .push_bind(t.academic_year);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn insert_charges(
    tx: &mut Transaction<'_, Postgres>,
    charges: &[TaggedCharge],
) -> anyhow::Result<()> {
    for chunk in charges.chunks(BATCH_ROWS) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO datamart.charges (prw_id, date, posted_date, provider, cpt, modifiers, \
             cpt_desc, quantity, wrvu, reversal_reason, insurance_class, location, month, \
             quarter, posted_month, posted_quarter, medicaid, inpatient) ",
        );
        builder.push_values(chunk, |mut row, t| {
            let c = &t.charge;
            row.push_bind(&c.patient_id)
                .push_bind(c.date)
                .push_bind(c.posted_date)
                .push_bind(&c.provider)
                .push_bind(&c.cpt)
                .push_bind(&c.modifiers)
                .push_bind(&c.cpt_desc)
                .push_bind(c.quantity)
                .push_bind(c.wrvu)
                .push_bind(&c.reversal_reason)
                .push_bind(&c.insurance_class)
                .push_bind(&c.location)
                .push_bind(&t.month)
                .push_bind(&t.quarter)
                .push_bind(&t.posted_month)
                .push_bind(&t.posted_quarter)
                .push_bind(t.medicaid)
                .push_bind(t.inpatient);
        });
        builder.build().execute(&mut **tx).await?;
    }
    Ok(())
}

/// Stores each top-level key of the key/value document as its own row.
async fn write_kv(
    tx: &mut Transaction<'_, Postgres>,
    datamart: &str,
    kv: &str,
) -> anyhow::Result<()> {
    let document: serde_json::Value = serde_json::from_str(kv).context("kv document is not JSON")?;
    let entries = document
        .as_object()
        .context("kv document must be a JSON object")?;

    sqlx::query("DELETE FROM datamart.kv WHERE datamart = $1")
        .bind(datamart)
        .execute(&mut **tx)
        .await?;
    for (key, value) in entries {
        sqlx::query("INSERT INTO datamart.kv (datamart, key, value) VALUES ($1, $2, $3::jsonb)")
            .bind(datamart)
            .bind(key)
            .bind(value.to_string())
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn write_meta(tx: &mut Transaction<'_, Postgres>, datamart: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO datamart.meta (datamart, modified)
        VALUES ($1, $2)
        ON CONFLICT (datamart) DO UPDATE SET modified = EXCLUDED.modified
        "#,
    )
    .bind(datamart)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residency_reads_outpatient_encounters() {
        let residency = encounters_sql(OUTPT_ENCOUNTERS_TABLE);
        assert!(residency.ends_with("FROM prw_encounters_outpt ORDER BY id"));
        let panel = encounters_sql(PANEL_ENCOUNTERS_TABLE);
        assert!(panel.ends_with("FROM prw_encounters ORDER BY id"));
    }

    #[test]
    fn charge_query_filters_in_the_warehouse() {
        assert!(CHARGES_SQL.contains("billing_provider = ANY($1)"));
        assert!(CHARGES_SQL.contains("service_date >= $2"));
        assert!(CHARGES_SQL.contains("modifiers NOT LIKE '%FAC%' OR modifiers IS NULL"));
        assert!(CHARGES_SQL.contains("wrvu <> 0 OR wrvu IS NULL"));
    }
}
